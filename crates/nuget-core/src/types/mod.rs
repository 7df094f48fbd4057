//! Core data types for nuget-rs.
//!
//! This module provides the fundamental types used throughout the workspace:
//! - `ServiceType`, the closed set of service index capabilities
//! - `TagMatch`, the result of matching a raw `@type` tag against that set

pub mod service_type;

// Re-export all public types
pub use service_type::{ServiceType, TagMatch, VERSION_SEPARATOR};
