//! Request building and execution
//!
//! [`RequestCore`] turns a method, target, body and per-call options into a
//! [`PreparedRequest`], then executes it: credentials are attached on every
//! attempt, transport failures and retryable statuses (429, 5xx) are retried
//! through the [`RetryPolicy`], and the request's cancellation token is
//! checked before each attempt, while the attempt is in flight and while
//! waiting out a backoff delay.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Method, Response};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use nuget_core::error::{ApiError, NuGetError};
use crate::auth::Auth;
use crate::retry::{ResponseHead, RetryPolicy, RETRY_ATTEMPT_HEADER};
use crate::ClientResult;

/// Where a request goes: a path under the base URL or an absolute URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Resolved against the client's base URL
    Relative(String),
    /// Used as-is
    Absolute(Url),
}

impl Target {
    /// Resolve against `base`. A leading `/` on a relative path replaces the
    /// base path, following URL reference rules.
    pub fn resolve(&self, base: &Url) -> ClientResult<Url> {
        match self {
            Target::Absolute(url) => Ok(url.clone()),
            Target::Relative(path) => base.join(path).map_err(|e| {
                NuGetError::build(format!("Cannot resolve '{}' against {}: {}", path, base, e))
            }),
        }
    }
}

impl From<&str> for Target {
    fn from(target: &str) -> Self {
        match Url::parse(target) {
            Ok(url) if url.has_host() => Target::Absolute(url),
            _ => Target::Relative(target.to_string()),
        }
    }
}

impl From<String> for Target {
    fn from(target: String) -> Self {
        Target::from(target.as_str())
    }
}

impl From<Url> for Target {
    fn from(url: Url) -> Self {
        Target::Absolute(url)
    }
}

impl From<&Url> for Target {
    fn from(url: &Url) -> Self {
        Target::Absolute(url.clone())
    }
}

/// Serialized request body and its content type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RequestBody {
    /// No body and no content type
    #[default]
    Empty,
    /// Raw bytes with an explicit content type
    Bytes { content_type: String, data: Vec<u8> },
}

impl RequestBody {
    /// Serialize `value` as a JSON body
    pub fn json<T: Serialize + ?Sized>(value: &T) -> ClientResult<Self> {
        let data = serde_json::to_vec(value)
            .map_err(|e| NuGetError::build(format!("Failed to serialize request body: {}", e)))?;
        Ok(RequestBody::Bytes {
            content_type: "application/json".to_string(),
            data,
        })
    }

    /// Raw bytes body
    pub fn bytes(content_type: impl Into<String>, data: Vec<u8>) -> Self {
        RequestBody::Bytes {
            content_type: content_type.into(),
            data,
        }
    }
}

impl From<()> for RequestBody {
    fn from(_: ()) -> Self {
        RequestBody::Empty
    }
}

/// Per-call overrides, applied in the order they were added.
///
/// A later header with the same name replaces an earlier one, and a later
/// cancellation token, attempt limit or timeout replaces an earlier one.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
    cancellation: Option<CancellationToken>,
    max_attempts: Option<u32>,
    timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Header that any header added through [`RequestOptions::header`] overrides
    pub(crate) fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(0, (name.into(), value.into()));
        self
    }

    /// Append a query parameter
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Cancel the request through `token`
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Override the policy's attempt limit for this call
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Per-attempt timeout for this call
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A fully built request, ready to execute
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    pub cancellation: CancellationToken,
    pub max_attempts: Option<u32>,
    pub timeout: Option<Duration>,
}

/// Builds and executes requests for one client configuration.
///
/// Immutable after construction; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct RequestCore {
    http: Client,
    base_url: Url,
    user_agent: HeaderValue,
    auth: Auth,
    retry: RetryPolicy,
}

impl RequestCore {
    pub fn new(
        http: Client,
        base_url: Url,
        user_agent: &str,
        auth: Auth,
        retry: RetryPolicy,
    ) -> ClientResult<Self> {
        let user_agent = HeaderValue::from_str(user_agent)
            .map_err(|e| NuGetError::build(format!("Invalid user agent '{}': {}", user_agent, e)))?;

        Ok(Self {
            http,
            base_url,
            user_agent,
            auth,
            retry,
        })
    }

    /// Base URL relative targets resolve against
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Retry policy in effect
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Build a request. Fails with a build error on malformed input.
    pub fn new_request(
        &self,
        method: Method,
        target: impl Into<Target>,
        body: impl Into<RequestBody>,
        options: RequestOptions,
    ) -> ClientResult<PreparedRequest> {
        let mut url = target.into().resolve(&self.base_url)?;
        if !options.query.is_empty() {
            url.query_pairs_mut().extend_pairs(options.query.iter());
        }

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, self.user_agent.clone());

        let body = match body.into() {
            RequestBody::Empty => None,
            RequestBody::Bytes { content_type, data } => {
                let value = HeaderValue::from_str(&content_type).map_err(|e| {
                    NuGetError::build(format!("Invalid content type '{}': {}", content_type, e))
                })?;
                headers.insert(CONTENT_TYPE, value);
                Some(data)
            }
        };

        for (name, value) in &options.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| NuGetError::build(format!("Invalid header name '{}': {}", name, e)))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| NuGetError::build(format!("Invalid value for header '{}': {}", name, e)))?;
            headers.insert(header_name, header_value);
        }

        Ok(PreparedRequest {
            method,
            url,
            headers,
            body,
            cancellation: options.cancellation.unwrap_or_default(),
            max_attempts: options.max_attempts,
            timeout: options.timeout,
        })
    }

    /// Execute with retries.
    ///
    /// Returns the final response whatever its status; classification is the
    /// caller's job. Errors are transport failures after the last attempt,
    /// cancellation, authentication failures and build failures.
    pub async fn execute(&self, request: &PreparedRequest) -> ClientResult<Response> {
        let max_attempts = request.max_attempts.unwrap_or(self.retry.max_attempts).max(1);
        let token = &request.cancellation;
        let mut delay = Duration::ZERO;
        let mut attempt: u32 = 1;

        loop {
            if token.is_cancelled() {
                return Err(NuGetError::Cancelled);
            }

            let builder = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(NuGetError::Cancelled),
                builder = self.attempt_builder(request, attempt) => builder?,
            };

            debug!(method = %request.method, url = %request.url, attempt, "Sending request");

            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(NuGetError::Cancelled),
                outcome = builder.send() => outcome,
            };

            let last_response = match outcome {
                Ok(response) => {
                    let status = response.status();
                    if !ApiError::is_retryable_status(status.as_u16()) || attempt >= max_attempts {
                        return Ok(response);
                    }
                    warn!(url = %request.url, status = status.as_u16(), attempt, "Retryable status");
                    Some(ResponseHead::from_response(&response))
                }
                Err(e) if e.is_builder() => {
                    return Err(NuGetError::build(format!("Failed to build request: {}", e)));
                }
                Err(e) => {
                    let error = NuGetError::transport(
                        format!("{} {} failed: {}", request.method, request.url, e),
                        e,
                    );
                    if attempt >= max_attempts {
                        return Err(error);
                    }
                    warn!(url = %request.url, attempt, error = %error, "Transport failure");
                    None
                }
            };

            delay = self.retry.delay_after(attempt, delay, last_response.as_ref());
            if !delay.is_zero() {
                debug!(delay_ms = delay.as_millis() as u64, "Backing off before retry");
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(NuGetError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            attempt += 1;
        }
    }

    /// Fresh reqwest builder for one attempt, credentials included
    async fn attempt_builder(
        &self,
        request: &PreparedRequest,
        attempt: u32,
    ) -> ClientResult<reqwest::RequestBuilder> {
        let mut headers = request.headers.clone();
        self.auth.apply(&mut headers).await?;
        if attempt > 1 {
            headers.insert(RETRY_ATTEMPT_HEADER, HeaderValue::from(attempt - 1));
        }

        let mut builder = self
            .http
            .request(request.method.clone(), request.url.clone())
            .headers(headers);
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(builder)
    }
}

/// Read a response body, aborting if `token` fires first
pub async fn read_body(response: Response, token: &CancellationToken) -> ClientResult<Vec<u8>> {
    let url = response.url().clone();
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(NuGetError::Cancelled),
        bytes = response.bytes() => bytes
            .map(|bytes| bytes.to_vec())
            .map_err(|e| NuGetError::transport(format!("Failed to read response from {}: {}", url, e), e)),
    }
}
