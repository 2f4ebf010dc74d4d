//! Retry executor: runs one job's backend call with bounded retries and
//! exponential backoff.

use crate::backend::GenerationBackend;
use crate::error::{BatchError, ErrorKind, OperationError};
use crate::job::{AuxiliaryInput, JobFailure, JobId, JobOutcome, JobPayload, JobResult, JobState};
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Retry configuration for a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Upper bound for a single delay.
    pub max_delay: Option<Duration>,
    /// Fraction in [0, 1) by which a delay may be stretched; 0 disables jitter.
    pub jitter: f64,
    /// Per-call timeout. Expiry counts as a transient failure.
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: None,
            jitter: 0.0,
            attempt_timeout: None,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> Result<(), BatchError> {
        if self.max_attempts == 0 {
            return Err(BatchError::InvalidPolicy(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(BatchError::InvalidPolicy(format!(
                "multiplier must be a finite value >= 1.0, got {}",
                self.multiplier
            )));
        }
        if !(0.0..1.0).contains(&self.jitter) {
            return Err(BatchError::InvalidPolicy(format!(
                "jitter must be in [0, 1), got {}",
                self.jitter
            )));
        }
        if self.attempt_timeout == Some(Duration::ZERO) {
            return Err(BatchError::InvalidPolicy(
                "attempt_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Delay after failed attempt `attempt` (1-based): `base * multiplier^(attempt-1)`,
    /// capped by `max_delay`. Jitter is not applied.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let delay = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);
        match self.max_delay {
            Some(cap) if delay > cap => cap,
            _ => delay,
        }
    }

    /// [`Self::backoff_delay`] stretched by a deterministic factor in `[1, 1 + jitter)`
    /// derived from `seed` and `attempt`.
    pub fn jittered_delay(&self, attempt: u32, seed: u64) -> Duration {
        let delay = self.backoff_delay(attempt);
        if self.jitter <= 0.0 {
            return delay;
        }
        let mut state = seed ^ (u64::from(attempt) << 32);
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let frac = ((state >> 32) as f64) / (u32::MAX as f64 + 1.0);
        Duration::try_from_secs_f64(delay.as_secs_f64() * (1.0 + self.jitter * frac))
            .unwrap_or(Duration::MAX)
    }

    /// Sum of un-jittered delays slept when every attempt fails transiently.
    pub fn total_backoff(&self) -> Duration {
        (1..self.max_attempts).map(|attempt| self.backoff_delay(attempt)).sum()
    }
}

/// Suspension used between attempts. Injected so timing can be tested.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Diagnostics for one attempt.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub job_id: JobId,
    pub attempt: u32,
    pub max_attempts: u32,
    pub elapsed: Duration,
    /// `None` on success.
    pub error: Option<OperationError>,
    /// Delay before the next attempt, if one will be made.
    pub retry_in: Option<Duration>,
}

impl AttemptRecord {
    pub fn state(&self) -> JobState {
        match (&self.error, self.retry_in) {
            (_, Some(_)) => JobState::InFlight(self.attempt + 1),
            (None, None) => JobState::Succeeded,
            (Some(_), None) => JobState::Failed,
        }
    }
}

pub trait AttemptObserver: Send + Sync {
    fn on_attempt(&self, record: &AttemptRecord);
}

impl<F> AttemptObserver for F
where
    F: Fn(&AttemptRecord) + Send + Sync,
{
    fn on_attempt(&self, record: &AttemptRecord) {
        self(record)
    }
}

#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    observer: Option<Arc<dyn AttemptObserver>>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            sleeper: Arc::new(TokioSleeper),
            observer: None,
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_observer(mut self, observer: Option<Arc<dyn AttemptObserver>>) -> Self {
        self.observer = observer;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run the job to a terminal result. Never fails: every outcome is a value.
    pub async fn execute(
        &self,
        job_id: &JobId,
        payload: &JobPayload,
        auxiliary: &[AuxiliaryInput],
        backend: &dyn GenerationBackend,
        cancel: &CancellationToken,
    ) -> JobResult {
        let started = Instant::now();
        let seed = jitter_seed(job_id);
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return finish(job_id, attempt, started, JobOutcome::Failed(JobFailure::cancelled()));
            }

            attempt += 1;
            let attempt_started = Instant::now();
            debug!(
                job_id = %job_id,
                attempt,
                max_attempts = self.policy.max_attempts,
                backend = backend.name(),
                "Dispatching attempt"
            );

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(job_id = %job_id, attempt, "Attempt abandoned on cancellation");
                    return finish(job_id, attempt, started, JobOutcome::Failed(JobFailure::cancelled()));
                }
                call = AssertUnwindSafe(self.call(payload, auxiliary, backend)).catch_unwind() => call,
            };

            let result = match result {
                Ok(result) => result,
                Err(panic) => {
                    let error = OperationError::InvalidResponse(format!(
                        "backend panicked: {}",
                        panic_message(panic.as_ref())
                    ));
                    self.observe(job_id, attempt, attempt_started, Some(&error), None);
                    error!(job_id = %job_id, attempt, error = %error, "Backend call panicked");
                    return finish(
                        job_id,
                        attempt,
                        started,
                        JobOutcome::Failed(JobFailure::new(ErrorKind::Permanent, error.to_string())),
                    );
                }
            };

            let error = match result {
                Ok(artifact) => {
                    self.observe(job_id, attempt, attempt_started, None, None);
                    debug!(
                        job_id = %job_id,
                        attempt,
                        bytes = artifact.bytes.len(),
                        "Attempt succeeded"
                    );
                    return finish(job_id, attempt, started, JobOutcome::Ok(artifact));
                }
                Err(error) => error,
            };

            if !error.is_retryable() {
                self.observe(job_id, attempt, attempt_started, Some(&error), None);
                warn!(
                    job_id = %job_id,
                    attempt,
                    error = %error,
                    "Job failed permanently"
                );
                return finish(
                    job_id,
                    attempt,
                    started,
                    JobOutcome::Failed(JobFailure::new(ErrorKind::Permanent, error.to_string())),
                );
            }

            if attempt >= self.policy.max_attempts {
                self.observe(job_id, attempt, attempt_started, Some(&error), None);
                warn!(
                    job_id = %job_id,
                    attempts = attempt,
                    error = %error,
                    "Retry attempts exhausted"
                );
                return finish(
                    job_id,
                    attempt,
                    started,
                    JobOutcome::Failed(JobFailure::new(ErrorKind::Exhausted, error.to_string())),
                );
            }

            let delay = self.policy.jittered_delay(attempt, seed);
            self.observe(job_id, attempt, attempt_started, Some(&error), Some(delay));
            warn!(
                job_id = %job_id,
                attempt,
                delay_ms = delay.as_millis(),
                error = %error,
                "Transient failure, retrying"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(job_id = %job_id, attempt, "Backoff interrupted by cancellation");
                    return finish(job_id, attempt, started, JobOutcome::Failed(JobFailure::cancelled()));
                }
                _ = self.sleeper.sleep(delay) => {}
            }
        }
    }

    async fn call(
        &self,
        payload: &JobPayload,
        auxiliary: &[AuxiliaryInput],
        backend: &dyn GenerationBackend,
    ) -> Result<crate::job::Artifact, OperationError> {
        match self.policy.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, backend.perform(payload, auxiliary))
                .await
                .unwrap_or_else(|_| {
                    Err(OperationError::Timeout(format!(
                        "no response within {} ms",
                        limit.as_millis()
                    )))
                }),
            None => backend.perform(payload, auxiliary).await,
        }
    }

    fn observe(
        &self,
        job_id: &JobId,
        attempt: u32,
        attempt_started: Instant,
        error: Option<&OperationError>,
        retry_in: Option<Duration>,
    ) {
        if let Some(observer) = &self.observer {
            observer.on_attempt(&AttemptRecord {
                job_id: job_id.clone(),
                attempt,
                max_attempts: self.policy.max_attempts,
                elapsed: attempt_started.elapsed(),
                error: error.cloned(),
                retry_in,
            });
        }
    }
}

fn finish(job_id: &JobId, attempts: u32, started: Instant, outcome: JobOutcome) -> JobResult {
    JobResult {
        id: job_id.clone(),
        attempts,
        elapsed: started.elapsed(),
        outcome,
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn jitter_seed(job_id: &JobId) -> u64 {
    let mut hasher = DefaultHasher::new();
    job_id.hash(&mut hasher);
    hasher.finish()
}
