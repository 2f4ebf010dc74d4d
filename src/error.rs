//! Error types for the Deckhead batch executor.
//!
//! Two layers: [`OperationError`] is what a backend reports for a single call and is
//! always captured inside a job result; [`BatchError`] is the only error `run` itself
//! returns, raised before any job starts.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure taxonomy for jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Rate limit, timeout, 5xx-equivalent. Retryable under policy.
    Transient,
    /// Invalid payload, auth failure, policy rejection. Never retried.
    Permanent,
    /// Batch cancellation observed before the job finished.
    Cancelled,
    /// Transient failures persisted past the attempt limit.
    Exhausted,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Transient => "transient",
            ErrorKind::Permanent => "permanent",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Exhausted => "exhausted",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors reported by a generation backend for one call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    #[error("Backend rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Backend request timed out: {0}")]
    Timeout(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Backend authentication failed: {0}")]
    AuthFailed(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),
}

impl OperationError {
    /// Transient vs permanent, declared per variant.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OperationError::RateLimited(_)
            | OperationError::Timeout(_)
            | OperationError::Unavailable(_)
            | OperationError::Network(_) => ErrorKind::Transient,
            OperationError::InvalidInput(_)
            | OperationError::AuthFailed(_)
            | OperationError::Rejected(_)
            | OperationError::InvalidResponse(_) => ErrorKind::Permanent,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

/// Errors that prevent a batch from starting.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Invalid concurrency: {0} (must be at least 1)")]
    InvalidConcurrency(usize),

    #[error("Batch contains no jobs")]
    EmptyBatch,

    #[error("Duplicate job id in batch: {0}")]
    DuplicateJobId(String),

    #[error("Concurrency gate closed")]
    GateClosed,

    #[error("Invalid retry policy: {0}")]
    InvalidPolicy(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for BatchError {
    fn from(err: config::ConfigError) -> Self {
        BatchError::Config(err.to_string())
    }
}
