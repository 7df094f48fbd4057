//! Utility functions and helpers.
//!
//! Common functionality used across multiple nuget-rs crates.

pub mod template;

// Re-export commonly used utilities
pub use template::{expand_template, template_placeholders};
