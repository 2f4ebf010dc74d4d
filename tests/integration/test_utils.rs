//! Shared helpers for batch integration tests.

use deckhead::batch::{Progress, ProgressObserver};
use deckhead::job::{JobPayload, JobRequest, JobResult};
use parking_lot::Mutex;
use std::time::Duration;

/// Prompt for job `index`, delimited so simulated-backend rules never match a prefix of
/// another job's prompt.
pub fn prompt(index: usize) -> String {
    format!("<job-{}>", index)
}

pub fn requests(count: usize) -> Vec<JobRequest> {
    (0..count)
        .map(|i| JobRequest::new(format!("job-{}", i), JobPayload::new(prompt(i))))
        .collect()
}

/// Records every observer callback.
#[derive(Default)]
pub struct RecordingObserver {
    pub started: Mutex<Vec<(usize, Duration)>>,
    pub progress: Mutex<Vec<Progress>>,
    pub finished: Mutex<Vec<String>>,
}

impl ProgressObserver for RecordingObserver {
    fn on_batch_started(&self, total: usize, estimate: Duration) {
        self.started.lock().push((total, estimate));
    }

    fn on_progress(&self, progress: Progress) {
        self.progress.lock().push(progress);
    }

    fn on_job_finished(&self, result: &JobResult, _progress: Progress) {
        self.finished.lock().push(result.id.to_string());
    }
}
