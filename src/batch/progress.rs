//! Progress tracking by completion count.

use crate::error::ErrorKind;
use crate::job::{JobId, JobResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Snapshot emitted after each job reaches a terminal result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn is_finished(&self) -> bool {
        self.completed >= self.total
    }

    /// Completion ratio in [0, 1].
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.completed as f64 / self.total as f64
    }
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.completed, self.total)
    }
}

/// Receives batch progress. Calls are serialized and never overlap.
pub trait ProgressObserver: Send + Sync {
    /// Called once before any job is dispatched.
    fn on_batch_started(&self, _total: usize, _estimate: Duration) {}

    fn on_progress(&self, progress: Progress);

    /// Per-job detail alongside the counter. Defaults to no-op.
    fn on_job_finished(&self, _result: &JobResult, _progress: Progress) {}
}

impl<F> ProgressObserver for F
where
    F: Fn(Progress) + Send + Sync,
{
    fn on_progress(&self, progress: Progress) {
        self(progress)
    }
}

/// Counts completions and forwards them to an optional observer.
///
/// Observer callbacks run on a dedicated thread fed by a channel, in the order they
/// were recorded. A slow or blocking observer never holds up the task that records.
pub struct ProgressTracker {
    total: usize,
    completed: usize,
    delivery: Option<Delivery>,
}

enum ProgressEvent {
    Started { total: usize, estimate: Duration },
    Finished { result: JobResult, progress: Progress },
}

enum Delivery {
    Thread {
        events: mpsc::UnboundedSender<ProgressEvent>,
        drained: oneshot::Receiver<()>,
    },
    Inline(Arc<dyn ProgressObserver>),
}

impl Delivery {
    fn spawn(observer: Arc<dyn ProgressObserver>) -> Self {
        let (events, mut inbox) = mpsc::unbounded_channel::<ProgressEvent>();
        let (done, drained) = oneshot::channel();
        let thread_observer = Arc::clone(&observer);
        let spawned = std::thread::Builder::new()
            .name("deckhead-progress".to_string())
            .spawn(move || {
                while let Some(event) = inbox.blocking_recv() {
                    deliver(thread_observer.as_ref(), event);
                }
                let _ = done.send(());
            });
        match spawned {
            Ok(_) => Delivery::Thread { events, drained },
            Err(e) => {
                warn!(error = %e, "Progress thread unavailable, notifying inline");
                Delivery::Inline(observer)
            }
        }
    }

    fn send(&self, event: ProgressEvent) {
        match self {
            Delivery::Thread { events, .. } => {
                if events.send(event).is_err() {
                    debug!("Progress observer stopped, dropping event");
                }
            }
            Delivery::Inline(observer) => deliver(observer.as_ref(), event),
        }
    }
}

fn deliver(observer: &dyn ProgressObserver, event: ProgressEvent) {
    match event {
        ProgressEvent::Started { total, estimate } => observer.on_batch_started(total, estimate),
        ProgressEvent::Finished { result, progress } => {
            observer.on_job_finished(&result, progress);
            observer.on_progress(progress);
        }
    }
}

impl ProgressTracker {
    pub fn new(total: usize, observer: Option<Arc<dyn ProgressObserver>>) -> Self {
        Self {
            total,
            completed: 0,
            delivery: observer.map(Delivery::spawn),
        }
    }

    pub fn started(&self, estimate: Duration) {
        if let Some(delivery) = &self.delivery {
            delivery.send(ProgressEvent::Started {
                total: self.total,
                estimate,
            });
        }
    }

    /// Record one terminal result and queue the notification. Returns the new snapshot.
    pub fn record(&mut self, result: &JobResult) -> Progress {
        debug_assert!(
            self.completed < self.total,
            "recorded more results than jobs ({} of {})",
            self.completed + 1,
            self.total
        );
        self.completed += 1;
        let progress = self.snapshot();

        debug!(
            job_id = %result.id,
            completed = progress.completed,
            total = progress.total,
            attempts = result.attempts,
            state = ?result.state(),
            outcome = outcome_label(result),
            "Job finished"
        );
        if progress.is_finished() {
            info!(total = progress.total, "All jobs finished");
        }

        if let Some(delivery) = &self.delivery {
            delivery.send(ProgressEvent::Finished {
                result: result.clone(),
                progress,
            });
        }
        progress
    }

    pub fn snapshot(&self) -> Progress {
        Progress {
            completed: self.completed,
            total: self.total,
        }
    }

    /// Wait until the observer has seen every queued event.
    pub async fn finish(self) {
        if let Some(Delivery::Thread { events, drained }) = self.delivery {
            drop(events);
            if drained.await.is_err() {
                warn!("Progress observer panicked before draining");
            }
        }
    }
}

fn outcome_label(result: &JobResult) -> &'static str {
    match result.error_kind() {
        None => "ok",
        Some(ErrorKind::Transient) => "transient",
        Some(ErrorKind::Permanent) => "permanent",
        Some(ErrorKind::Cancelled) => "cancelled",
        Some(ErrorKind::Exhausted) => "exhausted",
    }
}

/// Observer that reports progress through `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressObserver for LogProgress {
    fn on_batch_started(&self, total: usize, estimate: Duration) {
        info!(total, estimate_secs = estimate.as_secs(), "Batch started");
    }

    fn on_progress(&self, progress: Progress) {
        info!(
            completed = progress.completed,
            total = progress.total,
            "Progress {}",
            progress
        );
    }

    fn on_job_finished(&self, result: &JobResult, _progress: Progress) {
        if let Some(failure) = result.failure() {
            info!(job_id = %result.id, kind = %failure.kind, message = %failure.message, "Job failed");
        }
    }
}

/// Records job ids in the order their results arrived.
#[derive(Debug, Default)]
pub struct CompletionLog {
    entries: parking_lot::Mutex<Vec<(JobId, Progress)>>,
}

impl CompletionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(JobId, Progress)> {
        self.entries.lock().clone()
    }
}

impl ProgressObserver for CompletionLog {
    fn on_progress(&self, _progress: Progress) {}

    fn on_job_finished(&self, result: &JobResult, progress: Progress) {
        self.entries.lock().push((result.id.clone(), progress));
    }
}
