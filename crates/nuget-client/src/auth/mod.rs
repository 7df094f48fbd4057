//! Authentication strategies for outgoing requests
//!
//! Credentials are attached per attempt. The only shared mutable state is the
//! bearer token, which lives behind its own lock so a refresh happens once
//! even when many requests notice the expiry at the same time.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use tokio::sync::Mutex;
use tracing::debug;

use nuget_core::error::NuGetError;
use crate::ClientResult;

/// Header carrying a static NuGet API key
pub const API_KEY_HEADER: &str = "X-NuGet-ApiKey";

/// Tokens this close to expiry are refreshed before use
const EXPIRY_SKEW_SECS: i64 = 30;

/// A bearer token and, when known, the moment it stops being valid
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    /// Token with no known expiry
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            expires_at: None,
        }
    }

    /// Token that expires at `expires_at`
    pub fn expiring(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at: Some(expires_at),
        }
    }

    /// Check if the token is expired, or about to be, at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|expires_at| now + ChronoDuration::seconds(EXPIRY_SKEW_SECS) >= expires_at)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Supplies a fresh token when the current one has expired
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self) -> ClientResult<AccessToken>;
}

/// Bearer token authentication with optional refresh
#[derive(Clone)]
pub struct BearerAuth {
    token: Arc<Mutex<AccessToken>>,
    refresher: Option<Arc<dyn TokenRefresher>>,
}

impl BearerAuth {
    /// Static bearer token
    pub fn new(token: AccessToken) -> Self {
        Self {
            token: Arc::new(Mutex::new(token)),
            refresher: None,
        }
    }

    /// Bearer token refreshed through `refresher` once expired
    pub fn with_refresher(token: AccessToken, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            token: Arc::new(Mutex::new(token)),
            refresher: Some(refresher),
        }
    }

    /// Current token value, refreshing it first if expired.
    ///
    /// An expired token without a refresher is still sent; the server decides.
    pub async fn token(&self) -> ClientResult<String> {
        let mut current = self.token.lock().await;

        if current.is_expired_at(Utc::now()) {
            if let Some(refresher) = &self.refresher {
                debug!("Bearer token expired, refreshing");
                let fresh = refresher.refresh().await.map_err(|e| match e {
                    NuGetError::Authentication { .. } => e,
                    other => NuGetError::Authentication {
                        message: "Token refresh failed".to_string(),
                        source: Some(Box::new(other)),
                    },
                })?;
                *current = fresh;
            }
        }

        Ok(current.value.clone())
    }
}

impl fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerAuth")
            .field("refreshable", &self.refresher.is_some())
            .finish_non_exhaustive()
    }
}

/// Authentication configuration for source access
#[derive(Clone, Default)]
pub enum Auth {
    /// No credentials
    #[default]
    Anonymous,
    /// Static API key sent as `X-NuGet-ApiKey`
    ApiKey(String),
    /// `Authorization: Bearer` token
    Bearer(BearerAuth),
}

impl Auth {
    /// Static API key authentication
    pub fn api_key(key: impl Into<String>) -> Self {
        Auth::ApiKey(key.into())
    }

    /// Static bearer token authentication
    pub fn bearer(token: impl Into<String>) -> Self {
        Auth::Bearer(BearerAuth::new(AccessToken::new(token)))
    }

    /// Attach credential headers to an outgoing attempt
    pub async fn apply(&self, headers: &mut HeaderMap) -> ClientResult<()> {
        match self {
            Auth::Anonymous => {}
            Auth::ApiKey(key) => {
                headers.insert(HeaderName::from_static("x-nuget-apikey"), sensitive(key, "API key")?);
            }
            Auth::Bearer(bearer) => {
                let token = bearer.token().await?;
                headers.insert(AUTHORIZATION, sensitive(&format!("Bearer {}", token), "bearer token")?);
            }
        }
        Ok(())
    }
}

fn sensitive(value: &str, what: &str) -> ClientResult<HeaderValue> {
    let mut value = HeaderValue::from_str(value).map_err(|e| NuGetError::Authentication {
        message: format!("Invalid {}: {}", what, e),
        source: Some(Box::new(e)),
    })?;
    value.set_sensitive(true);
    Ok(value)
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::Anonymous => f.write_str("Anonymous"),
            Auth::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
            Auth::Bearer(bearer) => f.debug_tuple("Bearer").field(bearer).finish(),
        }
    }
}
