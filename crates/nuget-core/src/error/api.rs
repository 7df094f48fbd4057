//! Structured error for non-success HTTP responses.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error produced from a non-success HTTP status.
///
/// `message` is either the message the server supplied in its error body or
/// the HTTP status line (for example `"404 Not Found"`). Display prints the
/// message alone so consumers can match on it.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct ApiError {
    /// HTTP status code
    pub status: u16,
    /// Machine-readable error code, if the body carried one
    pub code: Option<String>,
    /// Human-readable message
    pub message: String,
}

impl ApiError {
    /// Create a new structured error
    pub fn new(status: u16, code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    /// Whether this status is in the conventionally retryable set (429 and 5xx)
    pub fn is_retryable_status(status: u16) -> bool {
        status == 429 || (500..600).contains(&status)
    }

    /// Whether the server rejected the credentials
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401 || self.status == 403
    }

    /// Whether the requested resource does not exist
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}
