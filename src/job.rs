//! Job records: requests going in, results coming out.

use crate::error::ErrorKind;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Job identifier, unique within a batch and stable across retries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Selects how the payload is augmented before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    #[default]
    Plain,
    /// Enhanced variant: the prompt is prefixed with data-visualisation instructions.
    Infographic,
}

/// Collaborator-defined input for one job.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobPayload {
    pub prompt: String,
    /// Free-form backend parameters (aspect ratio, size, ...).
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl JobPayload {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

/// Reference asset passed alongside the payload (e.g. a brand image).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxiliaryInput {
    pub name: String,
    pub media_type: Option<String>,
    pub data: Vec<u8>,
}

impl AuxiliaryInput {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: None,
            data,
        }
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }
}

/// One unit of work. Immutable once the batch starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub id: JobId,
    pub payload: JobPayload,
    pub auxiliary: Vec<AuxiliaryInput>,
    pub kind: JobKind,
}

impl JobRequest {
    pub fn new(id: impl Into<JobId>, payload: JobPayload) -> Self {
        Self {
            id: id.into(),
            payload,
            auxiliary: Vec::new(),
            kind: JobKind::Plain,
        }
    }

    pub fn with_kind(mut self, kind: JobKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_auxiliary(mut self, input: AuxiliaryInput) -> Self {
        self.auxiliary.push(input);
        self
    }
}

/// Metadata a backend attaches to its output.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// Declared output format, e.g. `png`.
    pub format: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// Raw output of a successful job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub metadata: ArtifactMetadata,
}

impl Artifact {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            metadata: ArtifactMetadata::default(),
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.metadata.format = Some(format.into());
        self
    }

    /// File extension for persisting this artifact.
    pub fn extension(&self) -> &str {
        self.metadata.format.as_deref().unwrap_or("bin")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl JobFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "batch cancelled")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Ok(Artifact),
    Failed(JobFailure),
}

/// Terminal record for one job. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub id: JobId,
    /// Attempts actually started (0 when cancelled before the first one).
    pub attempts: u32,
    /// Time from first attempt to terminal outcome, excluding gate wait.
    pub elapsed: Duration,
    pub outcome: JobOutcome,
}

impl JobResult {
    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, JobOutcome::Ok(_))
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        match &self.outcome {
            JobOutcome::Ok(artifact) => Some(artifact),
            JobOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&JobFailure> {
        match &self.outcome {
            JobOutcome::Ok(_) => None,
            JobOutcome::Failed(failure) => Some(failure),
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.failure().map(|f| f.kind)
    }

    pub fn state(&self) -> JobState {
        match self.outcome {
            JobOutcome::Ok(_) => JobState::Succeeded,
            JobOutcome::Failed(_) => JobState::Failed,
        }
    }
}

/// Lifecycle of a single job inside a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "attempt")]
pub enum JobState {
    Pending,
    InFlight(u32),
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

/// Ordered results of a batch plus aggregate counters.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub results: Vec<JobResult>,
    pub succeeded: usize,
    pub failed: usize,
    pub total_attempts: u64,
    pub wall_clock: Duration,
    pub estimated_duration: Duration,
    /// When the last job resolved
    pub finished_at: DateTime<Utc>,
}

impl BatchOutcome {
    pub(crate) fn from_results(
        results: Vec<JobResult>,
        wall_clock: Duration,
        estimated_duration: Duration,
    ) -> Self {
        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        let total_attempts = results.iter().map(|r| u64::from(r.attempts)).sum();
        Self {
            failed: results.len() - succeeded,
            succeeded,
            total_attempts,
            results,
            wall_clock,
            estimated_duration,
            finished_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed == 0
    }

    pub fn failed_ids(&self) -> Vec<&JobId> {
        self.results
            .iter()
            .filter(|r| !r.is_ok())
            .map(|r| &r.id)
            .collect()
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            total: self.results.len(),
            succeeded: self.succeeded,
            failed: self.failed,
            total_attempts: self.total_attempts,
            wall_clock_ms: self.wall_clock.as_millis(),
            estimated_ms: self.estimated_duration.as_millis(),
            finished_at: self.finished_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            failures: self
                .results
                .iter()
                .filter_map(|r| {
                    r.failure().map(|f| FailureSummary {
                        id: r.id.clone(),
                        kind: f.kind,
                        message: f.message.clone(),
                        attempts: r.attempts,
                    })
                })
                .collect(),
        }
    }
}

/// Serializable view of a [`BatchOutcome`] without artifact bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_attempts: u64,
    pub wall_clock_ms: u128,
    pub estimated_ms: u128,
    /// RFC 3339, UTC
    pub finished_at: String,
    pub failures: Vec<FailureSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureSummary {
    pub id: JobId,
    pub kind: ErrorKind,
    pub message: String,
    pub attempts: u32,
}
