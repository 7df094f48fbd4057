//! Configuration loading for nuget-rs
//!
//! This crate parses and validates nuget.toml files and layers them with
//! environment variables and command-line flags into a [`SourceConfig`]
//! that configures a `NuGetClient`.

pub mod toml;
pub mod merge;

// Re-export main types
pub use toml::{parse_nuget_toml, AuthSection, NuGetToml, RetrySection, SourceSection};
pub use merge::{ConfigLayering, ConfigLoader, ConfigSource, Credentials, SourceConfig, CONFIG_FILE_NAME};

use nuget_core::error::NuGetError;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, NuGetError>;
