//! Cancelling a batch resolves every unfinished job.

use super::test_utils::{prompt, requests, RecordingObserver};
use deckhead::backend::SimulatedBackend;
use deckhead::batch::{BatchOptions, BatchOrchestrator, ProgressObserver};
use deckhead::error::{ErrorKind, OperationError};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn cancel_after(delay: Duration) -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        trigger.cancel();
    });
    cancel
}

#[tokio::test(start_paused = true)]
async fn cancellation_mid_run_resolves_unfinished_jobs() {
    let backend = Arc::new(SimulatedBackend::new().with_latency(Duration::from_secs(1)));
    let orchestrator = BatchOrchestrator::new(backend.clone());
    let observer = Arc::new(RecordingObserver::default());

    let outcome = orchestrator
        .run_with_cancellation(
            requests(10),
            &BatchOptions::default().with_concurrency(2),
            Some(observer.clone() as Arc<dyn ProgressObserver>),
            cancel_after(Duration::from_millis(1500)),
        )
        .await
        .unwrap();

    assert_eq!(outcome.len(), 10);
    assert_eq!(outcome.succeeded, 2);
    assert_eq!(outcome.failed, 8);
    for result in outcome.results.iter().filter(|r| !r.is_ok()) {
        assert_eq!(result.error_kind(), Some(ErrorKind::Cancelled));
        assert!(result.attempts <= 1);
    }
    let interrupted = outcome.results.iter().filter(|r| r.attempts == 1 && !r.is_ok()).count();
    assert_eq!(interrupted, 2);
    assert!(outcome.wall_clock < Duration::from_secs(2));
    assert_eq!(observer.progress.lock().len(), 10);
    assert_eq!(backend.active(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_backoff_keeps_attempt_count() {
    let backend = Arc::new(
        SimulatedBackend::new()
            .with_persistent_failure(&prompt(0), OperationError::RateLimited("429".into())),
    );
    let orchestrator = BatchOrchestrator::new(backend);

    // first backoff is 1s, second 2s: cancel inside the second
    let outcome = orchestrator
        .run_with_cancellation(
            requests(1),
            &BatchOptions::default(),
            None,
            cancel_after(Duration::from_millis(2000)),
        )
        .await
        .unwrap();

    let result = &outcome.results[0];
    assert_eq!(result.error_kind(), Some(ErrorKind::Cancelled));
    assert_eq!(result.attempts, 2);
    assert!(outcome.wall_clock < Duration::from_millis(2100));
}
