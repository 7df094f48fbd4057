//! `nuget check`: validate configuration and, unless offline, resolve the
//! service index.

use nuget_config::{ConfigSource, Credentials, SourceConfig};
use nuget_core::error::NuGetResult;

use super::CommandContext;

pub async fn execute(offline: bool, ctx: &CommandContext) -> NuGetResult<()> {
    let config = ctx.load_config().await?;
    for line in describe(&config) {
        ctx.output.info(&line);
    }
    ctx.output.success("Configuration is valid");

    if offline {
        return Ok(());
    }

    let client = ctx.connect().await?;
    ctx.output.success(&format!(
        "Service index {} resolved to {} endpoints",
        client.index_url(),
        client.endpoints().len()
    ));
    Ok(())
}

/// Human-readable summary of the effective settings. Never shows secrets.
pub fn describe(config: &SourceConfig) -> Vec<String> {
    let origin = match &config.origin {
        ConfigSource::Project(path) | ConfigSource::Global(path) => path.to_string(),
        ConfigSource::Defaults => "built-in defaults".to_string(),
    };
    let credentials = match config.credentials {
        Credentials::None => "none",
        Credentials::ApiKey(_) => "API key",
        Credentials::Token(_) => "bearer token",
    };

    vec![
        format!("Config: {}", origin),
        format!("Source: {}", config.url),
        format!("Index: {}", config.index),
        format!("Credentials: {}", credentials),
        format!(
            "Retry: {} attempts, {}ms base delay, {}ms max delay, x{}",
            config.retry.max_attempts,
            config.retry.base_delay.as_millis(),
            config.retry.max_delay.as_millis(),
            config.retry.multiplier
        ),
    ]
}
