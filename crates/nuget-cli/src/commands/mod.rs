//! Command implementations and dispatch logic.
//!
//! Each command is an async function taking a [`CommandContext`], which
//! carries the working directory, output handler, configuration overrides
//! from global flags and the cancellation token fired by Ctrl-C.

use std::collections::HashMap;

use camino::Utf8PathBuf;
use tracing::info;

use nuget_client::{CancellationToken, NuGetClient, ServiceType};
use nuget_config::{ConfigLoader, SourceConfig};
use nuget_core::error::{NuGetError, NuGetResult};

pub mod check;
pub mod endpoints;
pub mod get;


use crate::{output::OutputHandler, Commands};

/// Shared context for all commands
pub struct CommandContext {
    pub cwd: Utf8PathBuf,
    pub output: OutputHandler,
    /// Configuration overrides from command-line flags
    pub overrides: HashMap<String, String>,
    pub cancel: CancellationToken,
}

impl CommandContext {
    /// Context for the process working directory
    pub fn new(overrides: HashMap<String, String>) -> NuGetResult<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| NuGetError::io("Failed to get current directory".to_string(), e))?;
        let cwd = Utf8PathBuf::try_from(cwd).map_err(|e| NuGetError::ConfigValidation {
            field: "cwd".to_string(),
            reason: format!("Working directory is not valid UTF-8: {}", e),
        })?;

        Ok(Self {
            cwd,
            output: OutputHandler::new(),
            overrides,
            cancel: CancellationToken::new(),
        })
    }

    /// Effective configuration for this invocation
    pub async fn load_config(&self) -> NuGetResult<SourceConfig> {
        ConfigLoader::new(self.cwd.clone())
            .load(self.overrides.clone())
            .await
    }

    /// Build a client for the configured source, resolving its service index
    pub async fn connect(&self) -> NuGetResult<NuGetClient> {
        let config = self.load_config().await?;
        info!(source = %config.url, "Connecting to source");
        config
            .into_builder()
            .cancellation(self.cancel.clone())
            .build()
            .await
    }
}

/// Dispatch a command to its handler
pub async fn dispatch_command(command: Commands, ctx: &CommandContext) -> NuGetResult<()> {
    match command {
        Commands::Endpoints => {
            info!("Listing endpoints");
            endpoints::execute(ctx).await
        }
        Commands::Get { capability, path, query } => {
            info!("Fetching {} (path: {:?})", capability, path);
            get::execute(capability, path, query, ctx).await
        }
        Commands::Check { offline } => {
            info!("Checking configuration (offline: {})", offline);
            check::execute(offline, ctx).await
        }
        Commands::Version => {
            info!("Showing version information");
            show_version(ctx).await
        }
    }
}

async fn show_version(ctx: &CommandContext) -> NuGetResult<()> {
    let target = format!("{}-{}", std::env::consts::ARCH, std::env::consts::OS);

    ctx.output.print(&format!("nuget v{}", env!("CARGO_PKG_VERSION")));
    ctx.output.info(&format!("Built: {}", env!("BUILD_DATE")));
    ctx.output.info(&format!("Target: {}", target));
    ctx.output.info(&format!("Rust: {}", env!("RUSTC_VERSION")));

    Ok(())
}

/// Parse a `key=value` query argument
pub fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

/// Parse a capability name, suggesting the closest match on a typo
pub fn parse_capability(input: &str) -> NuGetResult<ServiceType> {
    input.parse().map_err(|reason: String| {
        let reason = match suggest_capability(input) {
            Some(suggestion) => format!("{}. Did you mean '{}'?", reason, suggestion),
            None => reason,
        };
        NuGetError::ConfigValidation {
            field: "capability".to_string(),
            reason,
        }
    })
}

/// Suggest a capability based on edit distance
pub fn suggest_capability(input: &str) -> Option<ServiceType> {
    let input = input.to_ascii_lowercase();
    let mut best_match = None;
    let mut best_distance = usize::MAX;

    for service_type in ServiceType::ALL {
        let distance = edit_distance(&input, &service_type.name().to_ascii_lowercase());
        if distance < best_distance && distance <= 3 {
            best_distance = distance;
            best_match = Some(service_type);
        }
    }

    best_match
}

/// Calculate edit distance between two strings
fn edit_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    // Single-row Levenshtein
    let mut row: Vec<usize> = (0..=b_chars.len()).collect();
    for (i, a_char) in a_chars.iter().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = usize::from(a_char != b_char);
            let next = (row[j + 1] + 1).min(row[j] + 1).min(diagonal + cost);
            diagonal = row[j + 1];
            row[j + 1] = next;
        }
    }

    row[b_chars.len()]
}
