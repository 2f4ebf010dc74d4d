//! Deckhead: Bounded-Concurrency Batch Generation
//!
//! Turns a list of independent generation requests into a list of results while
//! respecting a maximum parallelism, retrying transient failures with backoff,
//! reporting incremental progress, and tolerating partial failure.
//!
//! ```no_run
//! use deckhead::backend::SimulatedBackend;
//! use deckhead::batch::{BatchOptions, BatchOrchestrator};
//! use deckhead::job::{JobPayload, JobRequest};
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), deckhead::error::BatchError> {
//! let orchestrator = BatchOrchestrator::new(Arc::new(SimulatedBackend::new()));
//! let jobs = vec![
//!     JobRequest::new("s1", JobPayload::new("A lighthouse at dawn")),
//!     JobRequest::new("s2", JobPayload::new("Quarterly revenue by region")),
//! ];
//! let outcome = orchestrator.run(jobs, &BatchOptions::default(), None).await?;
//! assert_eq!(outcome.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod job;
pub mod logging;
pub mod prompt;

pub use backend::GenerationBackend;
pub use batch::{BatchOptions, BatchOrchestrator, RetryPolicy};
pub use error::{BatchError, ErrorKind, OperationError};
pub use job::{BatchOutcome, JobRequest, JobResult};
