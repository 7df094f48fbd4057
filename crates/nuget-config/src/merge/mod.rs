//! Configuration layering, file discovery, and environment overrides
//!
//! Layers, lowest to highest priority: built-in defaults, the user-level
//! config file, the project nuget.toml, `NUGET_*` environment variables,
//! command-line flags.

use std::collections::HashMap;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use nuget_client::{NuGetClient, NuGetClientBuilder, RetryConfig, DEFAULT_INDEX_PATH, DEFAULT_SOURCE};
use nuget_core::error::NuGetError;
use crate::toml::{invalid, validate_config, validate_max_attempts, validate_source_url, NuGetToml};
use crate::ConfigResult;

/// Project configuration file name
pub const CONFIG_FILE_NAME: &str = "nuget.toml";

/// Environment variables read as overrides
pub const ENV_SOURCE: &str = "NUGET_SOURCE";
pub const ENV_INDEX: &str = "NUGET_INDEX";
pub const ENV_API_KEY: &str = "NUGET_API_KEY";
pub const ENV_TOKEN: &str = "NUGET_TOKEN";
pub const ENV_USER_AGENT: &str = "NUGET_USER_AGENT";
pub const ENV_MAX_ATTEMPTS: &str = "NUGET_MAX_ATTEMPTS";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Main configuration loading interface
pub struct ConfigLoader {
    /// Current working directory
    cwd: Utf8PathBuf,
}

/// Configuration layering and merging
pub struct ConfigLayering;

/// Where the file layer of a configuration came from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// User-level config file
    Global(Utf8PathBuf),
    /// Project nuget.toml file
    Project(Utf8PathBuf),
    /// No file found, defaults only
    Defaults,
}

/// Credentials for a source
#[derive(Clone, Default, PartialEq, Eq)]
pub enum Credentials {
    #[default]
    None,
    ApiKey(String),
    Token(String),
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::None => f.write_str("None"),
            Credentials::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
            Credentials::Token(_) => f.write_str("Token(<redacted>)"),
        }
    }
}

/// Fully resolved settings for one source
#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    pub url: String,
    pub index: String,
    pub user_agent: Option<String>,
    pub timeout: Duration,
    pub credentials: Credentials,
    pub retry: RetryConfig,
    /// File layer the settings were read from
    pub origin: ConfigSource,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SOURCE.to_string(),
            index: DEFAULT_INDEX_PATH.to_string(),
            user_agent: None,
            timeout: DEFAULT_TIMEOUT,
            credentials: Credentials::None,
            retry: RetryConfig::default(),
            origin: ConfigSource::Defaults,
        }
    }
}

impl SourceConfig {
    /// Client builder carrying these settings
    pub fn into_builder(self) -> NuGetClientBuilder {
        let mut builder = NuGetClient::builder(self.url)
            .index_path(self.index)
            .timeout(self.timeout)
            .retry_config(self.retry);

        if let Some(user_agent) = self.user_agent {
            builder = builder.user_agent(user_agent);
        }

        match self.credentials {
            Credentials::None => builder,
            Credentials::ApiKey(key) => builder.api_key(key),
            Credentials::Token(token) => builder.bearer_token(token),
        }
    }

    /// Overlay the values set in one file layer
    fn apply_file(&mut self, layer: &NuGetToml) {
        let source = &layer.source;
        if let Some(url) = &source.url {
            self.url = url.trim().to_string();
        }
        if let Some(index) = &source.index {
            self.index = index.clone();
        }
        if let Some(user_agent) = &source.user_agent {
            self.user_agent = Some(user_agent.clone());
        }
        if let Some(secs) = source.timeout_secs {
            self.timeout = Duration::from_secs(secs);
        }

        // A layer that names a credential replaces the lower layer's one
        if let Some(key) = &layer.auth.api_key {
            self.credentials = Credentials::ApiKey(key.clone());
        }
        if let Some(token) = &layer.auth.token {
            self.credentials = Credentials::Token(token.clone());
        }

        let retry = &layer.retry;
        if let Some(max_attempts) = retry.max_attempts {
            self.retry.max_attempts = max_attempts;
        }
        if let Some(ms) = retry.base_delay_ms {
            self.retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = retry.max_delay_ms {
            self.retry.max_delay = Duration::from_millis(ms);
        }
        if let Some(multiplier) = retry.multiplier {
            self.retry.multiplier = multiplier;
        }
    }

    /// Checks that hold across layers
    fn validate(&self) -> ConfigResult<()> {
        if self.retry.base_delay > self.retry.max_delay {
            return Err(invalid(
                "retry.base-delay-ms",
                &format!(
                    "{}ms exceeds max-delay-ms ({}ms)",
                    self.retry.base_delay.as_millis(),
                    self.retry.max_delay.as_millis()
                ),
            ));
        }
        Ok(())
    }
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new(cwd: Utf8PathBuf) -> Self {
        Self { cwd }
    }

    /// Loader rooted at the process working directory
    pub fn from_current_dir() -> ConfigResult<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| NuGetError::io("Failed to read current directory".to_string(), e))?;
        let cwd = Utf8PathBuf::try_from(cwd)
            .map_err(|e| invalid("cwd", &format!("Working directory is not valid UTF-8: {}", e)))?;
        Ok(Self::new(cwd))
    }

    /// Load every layer and resolve the effective settings
    pub async fn load(&self, cli_overrides: HashMap<String, String>) -> ConfigResult<SourceConfig> {
        let global = self.load_global_config().await?;
        let project = self.load_project_config().await?;

        ConfigLayering::merge_configs(
            global,
            project,
            ConfigLayering::collect_env_overrides(),
            cli_overrides,
        )
    }

    /// Project nuget.toml, searched from the working directory upwards
    pub async fn load_project_config(&self) -> ConfigResult<Option<(NuGetToml, Utf8PathBuf)>> {
        match self.resolve_config_path(CONFIG_FILE_NAME) {
            Some(path) => {
                debug!(path = %path, "Loading project configuration");
                let config = crate::toml::load_from_file(&path).await?;
                Ok(Some((config, path)))
            }
            None => Ok(None),
        }
    }

    /// Find configuration file in project (walks up directory tree)
    pub fn resolve_config_path(&self, filename: &str) -> Option<Utf8PathBuf> {
        let mut current: Option<&Utf8Path> = Some(self.cwd.as_path());

        while let Some(dir) = current {
            let config_path = dir.join(filename);
            if config_path.is_file() {
                return Some(config_path);
            }
            current = dir.parent();
        }

        None
    }

    /// User-level configuration in the platform config directory
    pub async fn load_global_config(&self) -> ConfigResult<Option<(NuGetToml, Utf8PathBuf)>> {
        let Some(path) = global_config_path() else {
            return Ok(None);
        };

        if path.is_file() {
            debug!(path = %path, "Loading user configuration");
            let config = crate::toml::load_from_file(&path).await?;
            Ok(Some((config, path)))
        } else {
            Ok(None)
        }
    }
}

/// `<config dir>/nuget-rs/nuget.toml`, if the platform has a config directory
pub fn global_config_path() -> Option<Utf8PathBuf> {
    let dir = dirs::config_dir()?;
    let dir = Utf8PathBuf::try_from(dir).ok()?;
    Some(dir.join("nuget-rs").join(CONFIG_FILE_NAME))
}

impl ConfigLayering {
    /// Merge multiple configuration layers over the defaults
    pub fn merge_configs(
        global_config: Option<(NuGetToml, Utf8PathBuf)>,
        project_config: Option<(NuGetToml, Utf8PathBuf)>,
        env_overrides: HashMap<String, String>,
        cli_overrides: HashMap<String, String>,
    ) -> ConfigResult<SourceConfig> {
        let mut merged = SourceConfig::default();

        if let Some((global, path)) = global_config {
            merged.apply_file(&global);
            merged.origin = ConfigSource::Global(path);
        }

        if let Some((project, path)) = project_config {
            merged.apply_file(&project);
            merged.origin = ConfigSource::Project(path);
        }

        Self::apply_env_overrides(&mut merged, &env_overrides)?;

        // CLI flags have the highest priority
        Self::apply_cli_overrides(&mut merged, &cli_overrides)?;

        merged.validate()?;
        Ok(merged)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(config: &mut SourceConfig, overrides: &HashMap<String, String>) -> ConfigResult<()> {
        let layer = Self::overrides_to_layer(
            overrides,
            [ENV_SOURCE, ENV_INDEX, ENV_USER_AGENT, ENV_API_KEY, ENV_TOKEN, ENV_MAX_ATTEMPTS],
        )?;
        config.apply_file(&layer);
        Ok(())
    }

    /// Apply CLI flag overrides
    fn apply_cli_overrides(config: &mut SourceConfig, overrides: &HashMap<String, String>) -> ConfigResult<()> {
        let layer = Self::overrides_to_layer(
            overrides,
            ["source", "index", "user-agent", "api-key", "token", "max-attempts"],
        )?;
        config.apply_file(&layer);
        Ok(())
    }

    /// Turn a flat override map into a layer. `keys` names the source,
    /// index, user agent, API key, token and attempt limit, in that order.
    fn overrides_to_layer(overrides: &HashMap<String, String>, keys: [&str; 6]) -> ConfigResult<NuGetToml> {
        let [source, index, user_agent, api_key, token, max_attempts] = keys;
        let value = |key: &str| {
            overrides
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let mut layer = NuGetToml::default();

        if let Some(url) = value(source) {
            validate_source_url(source, &url)?;
            layer.source.url = Some(url);
        }
        layer.source.index = value(index);
        layer.source.user_agent = value(user_agent);

        match (value(api_key), value(token)) {
            (Some(_), Some(_)) => {
                return Err(invalid(
                    api_key,
                    &format!("{} and {} are mutually exclusive", api_key, token),
                ));
            }
            (key, token) => {
                layer.auth.api_key = key;
                layer.auth.token = token;
            }
        }

        if let Some(raw) = value(max_attempts) {
            let attempts: u32 = raw
                .parse()
                .map_err(|e| invalid(max_attempts, &format!("'{}' is not a number: {}", raw, e)))?;
            validate_max_attempts(max_attempts, attempts)?;
            layer.retry.max_attempts = Some(attempts);
        }

        validate_config(&layer)?;
        Ok(layer)
    }

    /// Collect environment variable overrides
    pub fn collect_env_overrides() -> HashMap<String, String> {
        std::env::vars()
            .filter(|(key, _)| key.starts_with("NUGET_"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toml::parse_nuget_toml;
    use tempfile::TempDir;

    fn layer(content: &str, path: &str) -> Option<(NuGetToml, Utf8PathBuf)> {
        Some((parse_nuget_toml(content).unwrap(), Utf8PathBuf::from(path)))
    }

    fn temp_utf8(temp_dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap()
    }

    #[test]
    fn test_defaults_without_any_layer() {
        let config = ConfigLayering::merge_configs(None, None, HashMap::new(), HashMap::new()).unwrap();
        assert_eq!(config.url, DEFAULT_SOURCE);
        assert_eq!(config.index, DEFAULT_INDEX_PATH);
        assert_eq!(config.credentials, Credentials::None);
        assert_eq!(config.retry, RetryConfig::default());
        assert_eq!(config.origin, ConfigSource::Defaults);
    }

    #[tokio::test]
    async fn test_resolve_config_path_walks_up() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_utf8(&temp_dir);
        let nested = root.join("src").join("app");
        tokio::fs::create_dir_all(&nested).await.unwrap();

        let config_path = root.join(CONFIG_FILE_NAME);
        tokio::fs::write(&config_path, "[source]\nurl = \"https://example.org/v3/\"\n")
            .await
            .unwrap();

        let loader = ConfigLoader::new(nested);
        assert_eq!(loader.resolve_config_path(CONFIG_FILE_NAME), Some(config_path));
    }

    #[tokio::test]
    async fn test_load_project_config() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_utf8(&temp_dir);
        tokio::fs::write(
            root.join(CONFIG_FILE_NAME),
            "[source]\nurl = \"https://example.org/v3/\"\n\n[retry]\nmax-attempts = 5\n",
        )
        .await
        .unwrap();

        let loader = ConfigLoader::new(root.clone());
        let (config, path) = loader.load_project_config().await.unwrap().unwrap();
        assert_eq!(config.source.url.as_deref(), Some("https://example.org/v3/"));
        assert_eq!(config.retry.max_attempts, Some(5));
        assert_eq!(path, root.join(CONFIG_FILE_NAME));
    }

    #[tokio::test]
    async fn test_missing_project_config_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let loader = ConfigLoader::new(temp_utf8(&temp_dir).join("no-such-dir"));
        assert!(loader.load_project_config().await.unwrap().is_none());
    }

    #[test]
    fn test_merge_configs_precedence() {
        let global = layer(
            "[source]\nurl = \"https://global.example.org/v3/\"\nuser-agent = \"global/1.0\"\n\n[retry]\nmultiplier = 3.0\n",
            "/home/user/.config/nuget-rs/nuget.toml",
        );
        let project = layer(
            "[source]\nurl = \"https://project.example.org/v3/\"\n\n[auth]\napi-key = \"file-key\"\n",
            "/work/nuget.toml",
        );
        let env = HashMap::from([
            (ENV_TOKEN.to_string(), "env-token".to_string()),
            (ENV_MAX_ATTEMPTS.to_string(), "4".to_string()),
            ("NUGET_UNRELATED".to_string(), "ignored".to_string()),
        ]);
        let cli = HashMap::from([("source".to_string(), "https://cli.example.org/v3/".to_string())]);

        let merged = ConfigLayering::merge_configs(global, project, env, cli).unwrap();

        // CLI beats the project file
        assert_eq!(merged.url, "https://cli.example.org/v3/");
        // Global value survives when nothing overrides it
        assert_eq!(merged.user_agent.as_deref(), Some("global/1.0"));
        assert_eq!(merged.retry.multiplier, 3.0);
        // Environment credential replaces the file's
        assert_eq!(merged.credentials, Credentials::Token("env-token".to_string()));
        assert_eq!(merged.retry.max_attempts, 4);
        assert_eq!(merged.origin, ConfigSource::Project(Utf8PathBuf::from("/work/nuget.toml")));
    }

    #[test]
    fn test_invalid_env_attempts() {
        let env = HashMap::from([(ENV_MAX_ATTEMPTS.to_string(), "many".to_string())]);
        let err = ConfigLayering::merge_configs(None, None, env, HashMap::new()).unwrap_err();
        assert!(matches!(err, NuGetError::ConfigValidation { ref field, .. } if field == ENV_MAX_ATTEMPTS));

        let env = HashMap::from([(ENV_MAX_ATTEMPTS.to_string(), "0".to_string())]);
        assert!(ConfigLayering::merge_configs(None, None, env, HashMap::new()).is_err());
    }

    #[test]
    fn test_invalid_cli_source() {
        let cli = HashMap::from([("source".to_string(), "ftp://example.org".to_string())]);
        let err = ConfigLayering::merge_configs(None, None, HashMap::new(), cli).unwrap_err();
        assert!(matches!(err, NuGetError::ConfigValidation { ref field, .. } if field == "source"));
    }

    #[test]
    fn test_conflicting_env_credentials() {
        let env = HashMap::from([
            (ENV_API_KEY.to_string(), "key".to_string()),
            (ENV_TOKEN.to_string(), "token".to_string()),
        ]);
        assert!(ConfigLayering::merge_configs(None, None, env, HashMap::new()).is_err());
    }

    #[test]
    fn test_layered_delays_checked_together() {
        let global = layer("[retry]\nbase-delay-ms = 2000\n", "/global.toml");
        let project = layer("[retry]\nmax-delay-ms = 500\n", "/project.toml");
        assert!(ConfigLayering::merge_configs(global, project, HashMap::new(), HashMap::new()).is_err());
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let rendered = format!("{:?}", Credentials::ApiKey("oy2-secret".to_string()));
        assert!(!rendered.contains("oy2-secret"));
    }

    #[test]
    fn test_collect_env_overrides() {
        std::env::set_var("NUGET_COLLECT_TEST", "value");
        std::env::set_var("NOT_NUGET_COLLECT_TEST", "ignored");

        let overrides = ConfigLayering::collect_env_overrides();

        assert_eq!(overrides.get("NUGET_COLLECT_TEST").map(String::as_str), Some("value"));
        assert!(!overrides.contains_key("NOT_NUGET_COLLECT_TEST"));

        std::env::remove_var("NUGET_COLLECT_TEST");
        std::env::remove_var("NOT_NUGET_COLLECT_TEST");
    }

    #[tokio::test]
    async fn test_into_builder_resolves_against_source() {
        use wiremock::matchers::{header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed/custom-index.json"))
            .and(header("User-Agent", "config-test/1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "version": "3.0.0",
                "resources": [
                    { "@id": "https://example.org/query", "@type": "SearchQueryService" }
                ]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let cli = HashMap::from([
            ("source".to_string(), format!("{}/feed/", mock_server.uri())),
            ("index".to_string(), "custom-index.json".to_string()),
            ("user-agent".to_string(), "config-test/1.0".to_string()),
        ]);
        let config = ConfigLayering::merge_configs(None, None, HashMap::new(), cli).unwrap();

        let client = config.into_builder().build().await.unwrap();
        assert_eq!(
            client
                .endpoint_for(nuget_core::ServiceType::SearchQueryService)
                .map(|url| url.as_str()),
            Some("https://example.org/query")
        );
    }
}
