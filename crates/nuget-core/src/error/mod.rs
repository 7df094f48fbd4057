//! Error types and result aliases for nuget-rs operations.
//!
//! Provides a unified error type covering discovery, request building,
//! transport, HTTP status, cancellation and authentication failures, with
//! actionable error messages.

use thiserror::Error;

mod api;

pub use api::ApiError;

/// Boxed error source carried by transport-level variants
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Unified error type for all nuget-rs operations
#[derive(Error, Debug)]
pub enum NuGetError {
    // Config errors
    #[error("Failed to parse nuget.toml: {message}")]
    TomlParse { message: String },

    #[error("Configuration field '{field}' is invalid: {reason}")]
    ConfigValidation { field: String, reason: String },

    // Discovery errors
    #[error("Service index discovery failed for {url}: {message}")]
    Discovery {
        url: String,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    // Request errors
    #[error("Invalid request: {message}")]
    Build { message: String },

    #[error("Network error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Authentication failed: {message}")]
    Authentication {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Failed to decode response: {message}")]
    Decode {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    // IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for nuget-rs operations
pub type NuGetResult<T> = Result<T, NuGetError>;

/// Coarse classification of a [`NuGetError`] for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    Discovery,
    Build,
    Transport,
    Status,
    Cancelled,
    Authentication,
    Decode,
    Io,
}

impl NuGetError {
    /// Create a transport error from any error type
    pub fn transport<E>(message: String, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport {
            message,
            source: Some(Box::new(source)),
        }
    }

    /// Create a discovery error wrapping the failure that caused it
    pub fn discovery<E>(url: impl Into<String>, message: String, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Discovery {
            url: url.into(),
            message,
            source: Some(Box::new(source)),
        }
    }

    /// Create a request build error
    pub fn build(message: impl Into<String>) -> Self {
        Self::Build {
            message: message.into(),
        }
    }

    /// Create an IO error from std::io::Error
    pub fn io(message: String, source: std::io::Error) -> Self {
        Self::Io { message, source }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            NuGetError::TomlParse { .. } | NuGetError::ConfigValidation { .. } => {
                ErrorKind::Config
            },
            NuGetError::Discovery { .. } => ErrorKind::Discovery,
            NuGetError::Build { .. } => ErrorKind::Build,
            NuGetError::Transport { .. } => ErrorKind::Transport,
            NuGetError::Api(_) => ErrorKind::Status,
            NuGetError::Cancelled => ErrorKind::Cancelled,
            NuGetError::Authentication { .. } => ErrorKind::Authentication,
            NuGetError::Decode { .. } => ErrorKind::Decode,
            NuGetError::Io { .. } => ErrorKind::Io,
        }
    }

    /// Check if the request that produced this error may be retried.
    ///
    /// Only transport failures qualify; status-based retries are decided
    /// from the response status before an error is ever built.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, NuGetError::Transport { .. })
    }

    /// HTTP status code, when this error came from a non-success response
    pub fn status(&self) -> Option<u16> {
        match self {
            NuGetError::Api(api) => Some(api.status),
            _ => None,
        }
    }

    /// Get a user-friendly suggestion for fixing this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            NuGetError::Discovery { .. } => {
                Some("Check that the source URL points at a NuGet V3 service index")
            },
            NuGetError::Transport { .. } => Some("Check your internet connection and try again"),
            NuGetError::Api(api) if api.status == 401 || api.status == 403 => {
                Some("Check that your API key or token is valid for this source")
            },
            NuGetError::Api(api) if api.status == 404 => {
                Some("Check the package id and version spelling")
            },
            NuGetError::Authentication { .. } => Some("Sign in again to obtain a fresh token"),
            NuGetError::ConfigValidation { .. } | NuGetError::TomlParse { .. } => {
                Some("Run 'nuget check' to validate your nuget.toml")
            },
            _ => None,
        }
    }
}
