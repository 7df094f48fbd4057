//! NuGet V3 client core for nuget-rs
//!
//! This crate resolves a service index into a typed map of endpoints and
//! provides the authenticated, retrying request path that higher-level
//! operations (search, publish, downloads, vulnerability lookups) build on.

pub mod api;
pub mod auth;
pub mod client;
pub mod index;
pub mod request;
pub mod response;
pub mod retry;

// Re-export main types
pub use api::{ServiceIndex, ServiceIndexResource};
pub use auth::{AccessToken, Auth, BearerAuth, TokenRefresher, API_KEY_HEADER};
pub use client::{NuGetClient, NuGetClientBuilder, DEFAULT_INDEX_PATH, DEFAULT_SOURCE};
pub use index::EndpointMap;
pub use request::{PreparedRequest, RequestBody, RequestOptions, Target};
pub use response::{check_response, check_response_with, classify, status_line};
pub use retry::{
    Backoff, BackoffInput, ExponentialBackoff, ResponseHead, RetryConfig, RetryPolicy,
    ZeroBackoff, RETRY_ATTEMPT_HEADER,
};

pub use nuget_core::{ApiError, NuGetError, ServiceType};
pub use reqwest::Method;
pub use tokio_util::sync::CancellationToken;

/// Result type for client operations
pub type ClientResult<T> = Result<T, NuGetError>;
