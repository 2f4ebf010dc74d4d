//! CLI domain: parse, route, manifest loading, output, and presentation.
//! The batch core knows nothing about files; this layer turns a manifest into requests
//! and results back into files and a summary.

mod manifest;
mod output;
mod parse;
mod presentation;
mod route;

pub use manifest::{load_manifest, ManifestEntry};
pub use output::{map_error, write_artifacts, CommandOutput, EXIT_JOB_FAILURES};
pub use parse::{Cli, Commands, OutputFormat};
pub use presentation::{
    format_batch_summary_json, format_batch_summary_text, format_estimate, ConsoleProgress,
};
pub use route::RunContext;
