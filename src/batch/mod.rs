//! Bounded-concurrency batch execution.

pub mod gate;
pub mod orchestrator;
pub mod progress;
pub mod retry;

pub use gate::{ConcurrencyGate, GatePermit};
pub use orchestrator::{BatchOptions, BatchOrchestrator, DEFAULT_CONCURRENCY, DEFAULT_PER_JOB_ESTIMATE};
pub use progress::{CompletionLog, LogProgress, Progress, ProgressObserver, ProgressTracker};
pub use retry::{AttemptObserver, AttemptRecord, RetryExecutor, RetryPolicy, Sleeper, TokioSleeper};
