//! Deckhead CLI Binary
//!
//! Command-line front end for the Deckhead batch executor.

use anyhow::Context;
use clap::Parser;
use deckhead::cli::{map_error, Cli, RunContext};
use deckhead::config::{global_config_path, ConfigLoader};
use deckhead::logging::{init_logging, LoggingConfig};
use std::process;
use tracing::{error, info};

fn main() {
    let cli = Cli::parse();

    let logging_config = build_logging_config(&cli);
    if let Err(e) = init_logging(Some(&logging_config)) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    info!(version = env!("CARGO_PKG_VERSION"), "Deckhead CLI starting");

    match run(&cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<i32> {
    let context = RunContext::new(cli.workspace.clone(), cli.config.clone())
        .map_err(|e| anyhow::anyhow!(map_error(&e)))
        .with_context(|| format!("Failed to initialize workspace {}", cli.workspace.display()))?;

    let output = context
        .execute(&cli.command)
        .map_err(|e| anyhow::anyhow!(map_error(&e)))?;
    println!("{}", output.text);
    info!(exit_code = output.exit_code, "Command completed");
    Ok(output.exit_code)
}

/// Build logging configuration from CLI args and config file.
/// Precedence: CLI flags override config file override defaults.
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    let mut config = ConfigLoader::load_with(
        &cli.workspace,
        global_config_path().as_deref(),
        cli.config.as_deref(),
    )
    .map(|c| c.logging)
    .unwrap_or_default();

    if cli.quiet {
        config.enabled = false;
    }
    if cli.verbose {
        config.level = "debug".to_string();
    }
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.clone();
    }
    if let Some(ref output) = cli.log_output {
        config.output = output.clone();
    }
    if let Some(ref file) = cli.log_file {
        config.file = file.clone();
    }

    config
}
