//! NuGet client: one resolved service index plus the shared request path

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, ClientBuilder, Method, Response};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use nuget_core::error::NuGetError;
use nuget_core::types::ServiceType;
use crate::auth::{AccessToken, Auth, BearerAuth, TokenRefresher};
use crate::index::{self, EndpointMap};
use crate::request::{read_body, PreparedRequest, RequestBody, RequestCore, RequestOptions, Target};
use crate::response::check_response_with;
use crate::retry::{Backoff, RetryConfig, RetryPolicy};
use crate::ClientResult;

/// nuget.org's V3 base URL
pub const DEFAULT_SOURCE: &str = "https://api.nuget.org/v3/";

/// Service index path, relative to the base URL
pub const DEFAULT_INDEX_PATH: &str = "index.json";

/// Builder for [`NuGetClient`]
pub struct NuGetClientBuilder {
    base_url: String,
    index_path: String,
    auth: Auth,
    retry_config: RetryConfig,
    backoff: Option<Arc<dyn Backoff>>,
    user_agent: String,
    http_client: Option<Client>,
    timeout: Duration,
    cancellation: Option<CancellationToken>,
}

impl NuGetClientBuilder {
    /// Builder for the source at `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            index_path: DEFAULT_INDEX_PATH.to_string(),
            auth: Auth::Anonymous,
            retry_config: RetryConfig::default(),
            backoff: None,
            user_agent: default_user_agent(),
            http_client: None,
            timeout: Duration::from_secs(30),
            cancellation: None,
        }
    }

    /// Replace the base URL
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Service index location, relative to the base URL or absolute
    pub fn index_path(mut self, index_path: impl Into<String>) -> Self {
        self.index_path = index_path.into();
        self
    }

    pub fn auth(mut self, auth: Auth) -> Self {
        self.auth = auth;
        self
    }

    /// Authenticate with a static API key
    pub fn api_key(self, key: impl Into<String>) -> Self {
        self.auth(Auth::api_key(key))
    }

    /// Authenticate with a static bearer token
    pub fn bearer_token(self, token: impl Into<String>) -> Self {
        self.auth(Auth::bearer(token))
    }

    /// Authenticate with a bearer token refreshed by `refresher` once expired
    pub fn refreshing_token(self, token: AccessToken, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.auth(Auth::Bearer(BearerAuth::with_refresher(token, refresher)))
    }

    pub fn retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    /// Replace the default exponential backoff
    pub fn backoff(mut self, backoff: Arc<dyn Backoff>) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Use a preconfigured HTTP client; `timeout` then no longer applies
    pub fn http_client(mut self, http_client: Client) -> Self {
        self.http_client = Some(http_client);
        self
    }

    /// Per-attempt timeout of the built-in HTTP client
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Cancel service index resolution through `token`
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Build the client and resolve the service index.
    ///
    /// Fails with a discovery error when the index cannot be fetched or parsed.
    pub async fn build(self) -> ClientResult<NuGetClient> {
        let (base_url, source_index) = normalize_base_url(&self.base_url)?;

        let http = match self.http_client {
            Some(client) => client,
            None => ClientBuilder::new()
                // Connection pooling configuration
                .pool_max_idle_per_host(50)
                .pool_idle_timeout(Duration::from_secs(90))
                .timeout(self.timeout)
                .gzip(true)
                .build()
                .map_err(|e| NuGetError::transport(format!("Failed to create HTTP client: {}", e), e))?,
        };

        let mut retry = RetryPolicy::from_config(&self.retry_config);
        if let Some(backoff) = self.backoff {
            retry = retry.with_backoff(backoff);
        }

        let core = RequestCore::new(http, base_url, &self.user_agent, self.auth, retry)?;
        let index_url = match source_index {
            Some(index_url) => {
                if self.index_path != DEFAULT_INDEX_PATH {
                    warn!(
                        index_path = %self.index_path,
                        index_url = %index_url,
                        "Ignoring index path, the source URL already names the service index"
                    );
                }
                index_url
            }
            None => Target::from(self.index_path.as_str()).resolve(core.base_url())?,
        };

        let mut options = RequestOptions::new();
        if let Some(token) = self.cancellation {
            options = options.cancellation(token);
        }
        let endpoints = index::resolve(&core, &index_url, options).await?;

        Ok(NuGetClient {
            core,
            index_url,
            endpoints: Arc::new(endpoints),
        })
    }
}

/// Client for one NuGet V3 source.
///
/// Cheap to clone and safe to share across tasks; nothing in it changes after
/// construction except a refreshable bearer token, which has its own lock.
#[derive(Debug, Clone)]
pub struct NuGetClient {
    core: RequestCore,
    index_url: Url,
    endpoints: Arc<EndpointMap>,
}

impl NuGetClient {
    /// Client for `base_url` with default settings
    pub async fn new(base_url: &str) -> ClientResult<Self> {
        Self::builder(base_url).build().await
    }

    pub fn builder(base_url: impl Into<String>) -> NuGetClientBuilder {
        NuGetClientBuilder::new(base_url)
    }

    /// URL of a capability, or `None` if the source does not offer it
    pub fn endpoint_for(&self, service_type: ServiceType) -> Option<&Url> {
        self.endpoints.get(service_type)
    }

    pub fn endpoints(&self) -> &EndpointMap {
        &self.endpoints
    }

    pub fn base_url(&self) -> &Url {
        self.core.base_url()
    }

    pub fn index_url(&self) -> &Url {
        &self.index_url
    }

    /// URL under a capability, e.g. `newtonsoft.json/index.json` under
    /// `PackageBaseAddress`. The capability URL is treated as a directory.
    pub fn endpoint_url(&self, service_type: ServiceType, path: &str) -> ClientResult<Url> {
        let mut base = self.endpoints.require(service_type)?.clone();
        if path.is_empty() {
            return Ok(base);
        }
        if !base.path().ends_with('/') {
            let directory = format!("{}/", base.path());
            base.set_path(&directory);
        }
        base.join(path.trim_start_matches('/'))
            .map_err(|e| NuGetError::build(format!("Cannot join '{}' to {}: {}", path, base, e)))
    }

    /// Build a request without sending it
    pub fn new_request(
        &self,
        method: Method,
        target: impl Into<Target>,
        body: impl Into<RequestBody>,
        options: RequestOptions,
    ) -> ClientResult<PreparedRequest> {
        self.core.new_request(method, target, body, options)
    }

    /// Execute a prepared request with retries. The response is unclassified.
    pub async fn execute(&self, request: &PreparedRequest) -> ClientResult<Response> {
        self.core.execute(request).await
    }

    /// Build, execute and classify a request
    pub async fn send(
        &self,
        method: Method,
        target: impl Into<Target>,
        body: impl Into<RequestBody>,
        options: RequestOptions,
    ) -> ClientResult<Response> {
        let request = self.new_request(method, target, body, options)?;
        check_response_with(self.execute(&request).await?, &request.cancellation).await
    }

    /// Build, execute and classify a request, decoding the JSON body
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        target: impl Into<Target>,
        body: impl Into<RequestBody>,
        options: RequestOptions,
    ) -> ClientResult<T> {
        let request = self.new_request(method, target, body, options.default_header("Accept", "application/json"))?;
        let response = check_response_with(self.execute(&request).await?, &request.cancellation).await?;
        let bytes = read_body(response, &request.cancellation).await?;

        debug!(url = %request.url, bytes = bytes.len(), "Decoding JSON response");
        serde_json::from_slice(&bytes).map_err(|e| NuGetError::Decode {
            message: format!("{} returned an unexpected body: {}", request.url, e),
            source: Some(Box::new(e)),
        })
    }

    /// Build, execute and classify a request, returning the raw body
    pub async fn request_bytes(
        &self,
        method: Method,
        target: impl Into<Target>,
        body: impl Into<RequestBody>,
        options: RequestOptions,
    ) -> ClientResult<Vec<u8>> {
        let request = self.new_request(method, target, body, options)?;
        let response = check_response_with(self.execute(&request).await?, &request.cancellation).await?;
        read_body(response, &request.cancellation).await
    }
}

/// `nuget-rs/<version>`
pub fn default_user_agent() -> String {
    format!("nuget-rs/{}", env!("CARGO_PKG_VERSION"))
}

/// Parse a base URL, requiring http(s) and a host, and make its path a directory.
///
/// Sources are commonly configured by their index URL
/// (`https://api.nuget.org/v3/index.json`); such a URL is returned as the
/// index alongside its directory as the base.
fn normalize_base_url(raw: &str) -> ClientResult<(Url, Option<Url>)> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| NuGetError::build(format!("Invalid base URL '{}': {}", raw, e)))?;

    if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
        return Err(NuGetError::build(format!(
            "Base URL '{}' must be an http or https URL",
            raw
        )));
    }

    if url.path().ends_with(".json") {
        let index_url = url.clone();
        let base = url
            .join("./")
            .map_err(|e| NuGetError::build(format!("Invalid base URL '{}': {}", raw, e)))?;
        return Ok((base, Some(index_url)));
    }

    if !url.path().ends_with('/') {
        let directory = format!("{}/", url.path());
        url.set_path(&directory);
    }

    Ok((url, None))
}

#[cfg(test)]
mod tests;
