//! CLI parse: clap types for Deckhead. No behavior; definitions only.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Deckhead CLI - bounded-concurrency batch generation
#[derive(Parser, Debug)]
#[command(name = "deckhead")]
#[command(about = "Run batches of generation jobs with bounded concurrency and retries")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, global = true, default_value = ".")]
    pub workspace: PathBuf,

    /// Extra configuration file, layered over workspace files
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (debug level)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable logging entirely
    #[arg(long, short, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long, global = true)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every job in a manifest and write the artifacts
    Run {
        /// JSON manifest: [{ "id", "prompt", "kind"?, "parameters"?, "references"? }]
        #[arg(long)]
        manifest: PathBuf,

        /// Directory for `<id>.<format>` artifacts (default: batch.output_dir)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Maximum simultaneous backend calls (default: batch.max_concurrent)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Use the in-process simulated backend instead of HTTP
        #[arg(long)]
        simulate: bool,

        /// Simulated per-call latency in milliseconds
        #[arg(long, default_value = "200")]
        simulate_latency_ms: u64,

        /// Summary format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Estimate how long a batch would take
    Estimate {
        /// Number of jobs
        #[arg(long)]
        count: usize,

        /// Concurrency (default: batch.max_concurrent)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Seconds per job (default: batch.per_job_estimate_secs)
        #[arg(long)]
        per_job_secs: Option<u64>,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
