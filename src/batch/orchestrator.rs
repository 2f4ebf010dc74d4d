//! Batch orchestrator: fans jobs out through the gate and collects results in
//! request order.

use crate::backend::GenerationBackend;
use crate::batch::gate::ConcurrencyGate;
use crate::batch::progress::{ProgressObserver, ProgressTracker};
use crate::batch::retry::{
    panic_message, AttemptObserver, RetryExecutor, RetryPolicy, Sleeper, TokioSleeper,
};
use crate::error::{BatchError, ErrorKind};
use crate::job::{BatchOutcome, JobFailure, JobOutcome, JobRequest, JobResult, JobState};
use crate::prompt::{PayloadEnhancer, StyleEnhancer};
use futures::FutureExt;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Default cap on simultaneous backend calls.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Per-job duration used for the up-front estimate.
pub const DEFAULT_PER_JOB_ESTIMATE: Duration = Duration::from_secs(4);

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOptions {
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub per_job_estimate: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
            per_job_estimate: DEFAULT_PER_JOB_ESTIMATE,
        }
    }
}

impl BatchOptions {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_per_job_estimate(mut self, per_job: Duration) -> Self {
        self.per_job_estimate = per_job;
        self
    }
}

/// Runs batches of [`JobRequest`]s against one backend.
pub struct BatchOrchestrator {
    backend: Arc<dyn GenerationBackend>,
    enhancer: Arc<dyn PayloadEnhancer>,
    sleeper: Arc<dyn Sleeper>,
    attempt_observer: Option<Arc<dyn AttemptObserver>>,
}

impl BatchOrchestrator {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            backend,
            enhancer: Arc::new(StyleEnhancer::new()),
            sleeper: Arc::new(TokioSleeper),
            attempt_observer: None,
        }
    }

    pub fn with_enhancer(mut self, enhancer: Arc<dyn PayloadEnhancer>) -> Self {
        self.enhancer = enhancer;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_attempt_observer(mut self, observer: Arc<dyn AttemptObserver>) -> Self {
        self.attempt_observer = Some(observer);
        self
    }

    /// `ceil(job_count / concurrency) * per_job`. Concurrency 0 is treated as 1.
    pub fn estimate_duration(job_count: usize, concurrency: usize, per_job: Duration) -> Duration {
        let rounds = job_count.div_ceil(concurrency.max(1));
        per_job.saturating_mul(u32::try_from(rounds).unwrap_or(u32::MAX))
    }

    pub async fn run(
        &self,
        requests: Vec<JobRequest>,
        options: &BatchOptions,
        observer: Option<Arc<dyn ProgressObserver>>,
    ) -> Result<BatchOutcome, BatchError> {
        self.run_with_cancellation(requests, options, observer, CancellationToken::new())
            .await
    }

    /// Run the batch until every job is terminal or `cancel` fires.
    ///
    /// Returns `Err` only for invalid input, before any job starts. Job failures,
    /// including cancellation, are reported inside the outcome.
    pub async fn run_with_cancellation(
        &self,
        requests: Vec<JobRequest>,
        options: &BatchOptions,
        observer: Option<Arc<dyn ProgressObserver>>,
        cancel: CancellationToken,
    ) -> Result<BatchOutcome, BatchError> {
        let gate = ConcurrencyGate::new(options.concurrency)?;
        validate_requests(&requests)?;
        options.retry.validate()?;

        let total = requests.len();
        let estimate =
            Self::estimate_duration(total, options.concurrency, options.per_job_estimate);
        info!(
            jobs = total,
            concurrency = options.concurrency,
            max_attempts = options.retry.max_attempts,
            backend = self.backend.name(),
            estimate_secs = estimate.as_secs(),
            "Starting batch"
        );

        let mut tracker = ProgressTracker::new(total, observer);
        tracker.started(estimate);

        let executor = RetryExecutor::new(options.retry.clone())
            .with_sleeper(Arc::clone(&self.sleeper))
            .with_observer(self.attempt_observer.clone());
        let started = Instant::now();

        let ids: Vec<_> = requests.iter().map(|r| r.id.clone()).collect();
        let mut tasks = JoinSet::new();
        for (index, request) in requests.into_iter().enumerate() {
            let job = JobTask {
                gate: gate.clone(),
                executor: executor.clone(),
                backend: Arc::clone(&self.backend),
                enhancer: Arc::clone(&self.enhancer),
                cancel: cancel.clone(),
            };
            tasks.spawn(async move {
                let id = request.id.clone();
                let result = match AssertUnwindSafe(job.run(request)).catch_unwind().await {
                    Ok(result) => result,
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        error!(job_id = %id, panic = %message, "Job panicked");
                        JobResult {
                            id,
                            attempts: 0,
                            elapsed: Duration::ZERO,
                            outcome: JobOutcome::Failed(JobFailure::new(
                                ErrorKind::Permanent,
                                format!("job panicked: {}", message),
                            )),
                        }
                    }
                };
                (index, result)
            });
        }

        let mut slots: Vec<Option<JobResult>> = vec![None; total];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => {
                    tracker.record(&result);
                    slots[index] = Some(result);
                }
                Err(join_error) => {
                    error!(error = %join_error, "Job task did not complete");
                }
            }
        }

        let mut results = Vec::with_capacity(total);
        for (slot, id) in slots.into_iter().zip(ids) {
            match slot {
                Some(result) => results.push(result),
                None => {
                    let result = JobResult {
                        id,
                        attempts: 0,
                        elapsed: Duration::ZERO,
                        outcome: JobOutcome::Failed(JobFailure::cancelled()),
                    };
                    tracker.record(&result);
                    results.push(result);
                }
            }
        }

        let outcome = BatchOutcome::from_results(results, started.elapsed(), estimate);
        tracker.finish().await;
        info!(
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            total_attempts = outcome.total_attempts,
            wall_clock_ms = outcome.wall_clock.as_millis(),
            cancelled = cancel.is_cancelled(),
            "Batch finished"
        );
        Ok(outcome)
    }
}

fn validate_requests(requests: &[JobRequest]) -> Result<(), BatchError> {
    if requests.is_empty() {
        return Err(BatchError::EmptyBatch);
    }
    let mut seen = HashSet::with_capacity(requests.len());
    for request in requests {
        if !seen.insert(&request.id) {
            return Err(BatchError::DuplicateJobId(request.id.to_string()));
        }
    }
    Ok(())
}

/// Everything one spawned job needs.
struct JobTask {
    gate: ConcurrencyGate,
    executor: RetryExecutor,
    backend: Arc<dyn GenerationBackend>,
    enhancer: Arc<dyn PayloadEnhancer>,
    cancel: CancellationToken,
}

impl JobTask {
    async fn run(self, request: JobRequest) -> JobResult {
        debug!(job_id = %request.id, state = ?JobState::Pending, "Waiting for gate");

        let admitted = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            permit = self.gate.acquire() => Some(permit),
        };
        let permit = match admitted {
            Some(Ok(permit)) => permit,
            Some(Err(e)) => {
                return JobResult {
                    id: request.id,
                    attempts: 0,
                    elapsed: Duration::ZERO,
                    outcome: JobOutcome::Failed(JobFailure::new(ErrorKind::Cancelled, e.to_string())),
                };
            }
            None => {
                debug!(job_id = %request.id, "Cancelled before admission");
                return JobResult {
                    id: request.id,
                    attempts: 0,
                    elapsed: Duration::ZERO,
                    outcome: JobOutcome::Failed(JobFailure::cancelled()),
                };
            }
        };

        debug!(
            job_id = %request.id,
            state = ?JobState::InFlight(1),
            in_flight = self.gate.in_flight(),
            "Admitted"
        );

        let payload = self.enhancer.enhance(&request);
        let result = self
            .executor
            .execute(
                &request.id,
                &payload,
                &request.auxiliary,
                self.backend.as_ref(),
                &self.cancel,
            )
            .await;
        drop(permit);
        result
    }
}
