//! nuget.toml configuration parsing and validation

use serde::{Deserialize, Serialize};
use url::Url;

use nuget_core::error::NuGetError;
use crate::ConfigResult;

/// Complete nuget.toml configuration.
///
/// Every setting is optional so that files can be layered on top of each
/// other; unset values fall through to the next layer and finally to defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NuGetToml {
    /// Package source
    #[serde(default)]
    pub source: SourceSection,

    /// Credentials
    #[serde(default)]
    pub auth: AuthSection,

    /// Retry and backoff
    #[serde(default)]
    pub retry: RetrySection,
}

/// `[source]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SourceSection {
    /// Base URL of the V3 feed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Service index path, relative to `url`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Per-attempt transport timeout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// `[auth]` section. At most one of the two may be set.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct AuthSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Bearer token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSection")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// `[retry]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RetrySection {
    /// Attempts including the first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_delay_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<f64>,
}

/// Parse TOML string to NuGetToml configuration
pub fn parse_nuget_toml(content: &str) -> ConfigResult<NuGetToml> {
    // First pass with toml_edit for located syntax errors
    content
        .parse::<toml_edit::DocumentMut>()
        .map_err(|e| NuGetError::TomlParse {
            message: format!("TOML syntax error: {}", e),
        })?;

    // Then parse with serde for type safety
    let config: NuGetToml = toml::from_str(content).map_err(|e| NuGetError::TomlParse {
        message: format!("TOML parsing error: {}", e),
    })?;

    validate_config(&config)?;

    Ok(config)
}

/// Validate the values present in a configuration layer
pub fn validate_config(config: &NuGetToml) -> ConfigResult<()> {
    if let Some(url) = &config.source.url {
        validate_source_url("source.url", url)?;
    }

    if let Some(index) = &config.source.index {
        if index.trim().is_empty() {
            return Err(invalid("source.index", "must not be empty"));
        }
    }

    if config.source.timeout_secs == Some(0) {
        return Err(invalid("source.timeout-secs", "must be at least 1"));
    }

    if config.auth.api_key.is_some() && config.auth.token.is_some() {
        return Err(invalid("auth", "api-key and token are mutually exclusive"));
    }

    let retry = &config.retry;
    if let Some(max_attempts) = retry.max_attempts {
        validate_max_attempts("retry.max-attempts", max_attempts)?;
    }

    if let Some(multiplier) = retry.multiplier {
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(invalid(
                "retry.multiplier",
                &format!("must be a number >= 1.0, got {}", multiplier),
            ));
        }
    }

    if let (Some(base), Some(max)) = (retry.base_delay_ms, retry.max_delay_ms) {
        if base > max {
            return Err(invalid(
                "retry.base-delay-ms",
                &format!("{} exceeds max-delay-ms ({})", base, max),
            ));
        }
    }

    Ok(())
}

/// Source URLs must be absolute http(s) URLs with a host
pub(crate) fn validate_source_url(field: &str, raw: &str) -> ConfigResult<()> {
    let url = Url::parse(raw.trim())
        .map_err(|e| invalid(field, &format!("'{}' is not a valid URL: {}", raw, e)))?;

    if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
        return Err(invalid(
            field,
            &format!("'{}' must be an http or https URL", raw),
        ));
    }

    Ok(())
}

pub(crate) fn validate_max_attempts(field: &str, max_attempts: u32) -> ConfigResult<()> {
    if max_attempts < 1 {
        return Err(invalid(field, "must be at least 1"));
    }
    Ok(())
}

pub(crate) fn invalid(field: &str, reason: &str) -> NuGetError {
    NuGetError::ConfigValidation {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Load and parse nuget.toml from file path
pub async fn load_from_file(path: &camino::Utf8Path) -> ConfigResult<NuGetToml> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| NuGetError::io(format!("Failed to read {}", path), e))?;

    parse_nuget_toml(&content).map_err(|e| match e {
        NuGetError::TomlParse { message } => NuGetError::TomlParse {
            message: format!("In file {}: {}", path, message),
        },
        NuGetError::ConfigValidation { field, reason } => NuGetError::ConfigValidation {
            field,
            reason: format!("in file {}: {}", path, reason),
        },
        other => other,
    })
}
