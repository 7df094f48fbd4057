//! # nuget-cli
//!
//! Command-line front end for the nuget-rs client core.
//!
//! This is the main entry point for the `nuget` tool. It parses commands,
//! sets up logging and error reporting, loads layered configuration and
//! dispatches to the command handlers.

use std::collections::HashMap;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use nuget_core::error::NuGetError;

mod commands;
mod output;

use commands::CommandContext;
use output::errors::ErrorFormatter;

/// Talk to NuGet V3 package sources
#[derive(Parser)]
#[command(name = "nuget", version, about = "NuGet V3 source client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Source base URL or service index URL
    #[arg(long, global = true, value_name = "URL")]
    pub source: Option<String>,

    /// Service index path, relative to the source
    #[arg(long, global = true, value_name = "PATH")]
    pub index: Option<String>,

    /// API key sent as X-NuGet-ApiKey
    #[arg(long, global = true, conflicts_with = "token")]
    pub api_key: Option<String>,

    /// Bearer token
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Attempts per request, including the first
    #[arg(long, global = true, value_name = "N")]
    pub max_attempts: Option<u32>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the endpoints the source's service index resolves to
    Endpoints,
    /// GET a capability URL and print the JSON response
    Get {
        /// Capability name, e.g. SearchQueryService
        capability: String,
        /// Path under the capability URL
        path: Option<String>,
        /// Query parameter as key=value, repeatable
        #[arg(short, long = "query", value_name = "KEY=VALUE", value_parser = commands::parse_key_value)]
        query: Vec<(String, String)>,
    },
    /// Validate configuration and resolve the service index
    Check {
        /// Only validate configuration, without contacting the source
        #[arg(long)]
        offline: bool,
    },
    /// Show version information
    Version,
}

impl Cli {
    /// Global flags as configuration overrides
    fn overrides(&self) -> HashMap<String, String> {
        let flags = [
            ("source", &self.source),
            ("index", &self.index),
            ("api-key", &self.api_key),
            ("token", &self.token),
        ];

        let mut overrides: HashMap<String, String> = flags
            .into_iter()
            .filter_map(|(key, value)| value.clone().map(|v| (key.to_string(), v)))
            .collect();
        if let Some(attempts) = self.max_attempts {
            overrides.insert("max-attempts".to_string(), attempts.to_string());
        }
        overrides
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose);
    setup_panic_handler();

    info!("Starting nuget v{}", env!("CARGO_PKG_VERSION"));

    match run_cli(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let formatter = ErrorFormatter::new();
            match err.downcast_ref::<NuGetError>() {
                Some(nuget_error) => eprintln!("{}", formatter.format_error(nuget_error)),
                None => eprintln!("{}", formatter.format_simple(&format!("{:#}", err))),
            }
            ExitCode::FAILURE
        }
    }
}

fn run_cli(cli: Cli) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;

    rt.block_on(async {
        let ctx = CommandContext::new(cli.overrides())?;

        let cancel = ctx.cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, cancelling");
                cancel.cancel();
            }
        });

        commands::dispatch_command(cli.command, &ctx).await?;
        Ok(())
    })
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,nuget={level},nuget_client={level},nuget_config={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        error!("nuget encountered an unexpected error: {}", panic_info);
        eprintln!("nuget crashed! This is a bug.");
        eprintln!("Error: {}", panic_info);
    }));
}
