//! CLI output: artifact persistence, command results, and error mapping.

use crate::error::BatchError;
use crate::job::BatchOutcome;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Process exit code when the batch ran but at least one job failed.
pub const EXIT_JOB_FAILURES: i32 = 2;

/// Rendered command output plus the exit code the binary should use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub text: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            exit_code: 0,
        }
    }
}

/// Map domain errors to a string for CLI output.
pub fn map_error(e: &BatchError) -> String {
    match e {
        BatchError::Config(msg) => format!("Configuration error: {}", msg),
        BatchError::Manifest(msg) => format!("Manifest error: {}", msg),
        other => other.to_string(),
    }
}

/// Write every successful artifact as `<id>.<format>` under `dir`.
pub fn write_artifacts(outcome: &BatchOutcome, dir: &Path) -> Result<Vec<PathBuf>, BatchError> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(outcome.succeeded);
    for result in &outcome.results {
        if let Some(artifact) = result.artifact() {
            let path = dir.join(format!("{}.{}", result.id, artifact.extension()));
            std::fs::write(&path, &artifact.bytes)?;
            debug!(job_id = %result.id, path = %path.display(), bytes = artifact.bytes.len(), "Artifact written");
            written.push(path);
        }
    }
    Ok(written)
}
