//! # nuget-core
//!
//! Core types and utilities shared across all nuget-rs crates.
//!
//! This crate provides:
//! - `NuGetError` enum for unified error handling, plus the structured `ApiError`
//! - `ServiceType`, the catalog of service index resource types this client recognizes
//! - Utility functions for URL and URI template handling
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `types`: Core data types (ServiceType, TagMatch)
//! - `error`: Error types and result aliases
//! - `utils`: Utility functions and helpers

pub mod error;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use error::{ApiError, ErrorKind, NuGetError, NuGetResult};
pub use types::{ServiceType, TagMatch};
