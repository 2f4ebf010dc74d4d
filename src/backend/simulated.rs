//! In-process backend for dry runs and tests.
//!
//! Returns the dispatched prompt as a text artifact after a configurable latency.
//! Rules keyed by a prompt substring can inject latency or scripted failures.

use crate::backend::GenerationBackend;
use crate::error::OperationError;
use crate::job::{Artifact, AuxiliaryInput, JobPayload};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug)]
struct Rule {
    key: String,
    latency: Option<Duration>,
    failures: VecDeque<OperationError>,
    persistent: Option<OperationError>,
    calls: usize,
}

impl Rule {
    fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            latency: None,
            failures: VecDeque::new(),
            persistent: None,
            calls: 0,
        }
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub struct SimulatedBackend {
    latency: Duration,
    format: String,
    rules: Mutex<Vec<Rule>>,
    calls: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self {
            latency: Duration::ZERO,
            format: "txt".to_string(),
            rules: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Latency applied to every call without a more specific rule.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_latency_for(self, key: &str, latency: Duration) -> Self {
        self.update_rule(key, |rule| rule.latency = Some(latency));
        self
    }

    /// Fail the next calls matching `key` with these errors, in order, then succeed.
    pub fn with_failures(self, key: &str, failures: Vec<OperationError>) -> Self {
        self.update_rule(key, |rule| rule.failures.extend(failures));
        self
    }

    /// Fail every call matching `key` once scripted failures are used up.
    pub fn with_persistent_failure(self, key: &str, error: OperationError) -> Self {
        self.update_rule(key, |rule| rule.persistent = Some(error));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, key: &str) -> usize {
        self.rules
            .lock()
            .iter()
            .find(|rule| rule.key == key)
            .map(|rule| rule.calls)
            .unwrap_or(0)
    }

    /// Calls currently inside `perform`.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping calls observed.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn update_rule(&self, key: &str, apply: impl FnOnce(&mut Rule)) {
        let mut rules = self.rules.lock();
        match rules.iter_mut().find(|rule| rule.key == key) {
            Some(rule) => apply(rule),
            None => {
                let mut rule = Rule::new(key);
                apply(&mut rule);
                rules.push(rule);
            }
        }
    }

    fn plan_call(&self, prompt: &str) -> (Duration, Option<OperationError>) {
        let mut rules = self.rules.lock();
        match rules.iter_mut().find(|rule| prompt.contains(&rule.key)) {
            Some(rule) => {
                rule.calls += 1;
                let failure = rule
                    .failures
                    .pop_front()
                    .or_else(|| rule.persistent.clone());
                (rule.latency.unwrap_or(self.latency), failure)
            }
            None => (self.latency, None),
        }
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationBackend for SimulatedBackend {
    async fn perform(
        &self,
        payload: &JobPayload,
        _auxiliary: &[AuxiliaryInput],
    ) -> Result<Artifact, OperationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _active = ActiveGuard(&self.active);

        let (latency, failure) = self.plan_call(&payload.prompt);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(Artifact::new(payload.prompt.clone().into_bytes()).with_format(&self.format)),
        }
    }

    fn name(&self) -> &str {
        "simulated"
    }
}
