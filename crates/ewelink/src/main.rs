mod cli;
mod commands;
mod error;
mod output;

use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use ewelink_core::Discovery;

use crate::cli::{Cli, GlobalOpts, OutputFormat};
use crate::commands::Context;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = ewelink_config::load_config(cli.global.config.as_deref())?;
    if cli.global.no_cloud {
        config.cloud.enabled = false;
    }

    let ctx = build_context(&cli.global, &config.defaults)?;
    let discovery = Discovery::new(ewelink_config::to_discovery_config(&config)?)?;

    tracing::debug!(command = ?cli.command, "dispatching command");
    commands::dispatch(cli.command, &discovery, &ctx).await
}

/// Merge CLI flags over the `[defaults]` table.
fn build_context(global: &GlobalOpts, defaults: &ewelink_config::Defaults) -> Result<Context, CliError> {
    let output = match global.output {
        Some(format) => format,
        None => OutputFormat::from_str(&defaults.output, true).map_err(|reason| {
            CliError::Validation {
                field: "defaults.output".into(),
                reason,
            }
        })?,
    };

    Ok(Context {
        output,
        color: output::should_color(global.color),
        wait: Duration::from_secs(global.wait.unwrap_or(defaults.wait)),
    })
}
