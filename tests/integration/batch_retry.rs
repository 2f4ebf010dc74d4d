//! Retry behavior observed through the orchestrator.

use super::test_utils::{prompt, requests};
use deckhead::backend::SimulatedBackend;
use deckhead::batch::{AttemptObserver, AttemptRecord, BatchOptions, BatchOrchestrator, RetryPolicy};
use deckhead::error::{ErrorKind, OperationError};
use deckhead::job::{JobPayload, JobRequest};
use deckhead::prompt::PassthroughEnhancer;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

fn orchestrator(backend: Arc<SimulatedBackend>) -> BatchOrchestrator {
    BatchOrchestrator::new(backend).with_enhancer(Arc::new(PassthroughEnhancer))
}

#[tokio::test(start_paused = true)]
async fn always_transient_job_exhausts_with_exponential_delays() {
    let backend = Arc::new(
        SimulatedBackend::new()
            .with_persistent_failure(&prompt(0), OperationError::Unavailable("503".into())),
    );
    let outcome = orchestrator(backend.clone())
        .run(requests(1), &BatchOptions::default(), None)
        .await
        .unwrap();

    let result = &outcome.results[0];
    assert_eq!(result.error_kind(), Some(ErrorKind::Exhausted));
    assert_eq!(result.attempts, 4);
    assert_eq!(backend.calls(), 4);
    // 1 + 2 + 4 seconds of backoff
    assert!(outcome.wall_clock >= Duration::from_secs(7));
    assert!(outcome.wall_clock < Duration::from_millis(7100));
    assert!(result.failure().unwrap().message.contains("503"));
}

#[tokio::test]
async fn permanent_failure_makes_exactly_one_attempt() {
    let backend = Arc::new(
        SimulatedBackend::new()
            .with_persistent_failure(&prompt(1), OperationError::AuthFailed("401".into())),
    );
    let outcome = orchestrator(backend.clone())
        .run(requests(3), &BatchOptions::default(), None)
        .await
        .unwrap();

    assert_eq!(outcome.results[1].attempts, 1);
    assert_eq!(outcome.results[1].error_kind(), Some(ErrorKind::Permanent));
    assert_eq!(backend.calls_for(&prompt(1)), 1);
    assert_eq!(outcome.succeeded, 2);
    assert_eq!(outcome.total_attempts, 3);
}

#[tokio::test(start_paused = true)]
async fn flaky_job_recovers_on_third_attempt() {
    let backend = Arc::new(SimulatedBackend::new().with_failures(
        "x",
        vec![
            OperationError::RateLimited("429".into()),
            OperationError::Timeout("deadline".into()),
        ],
    ));
    let jobs = vec![JobRequest::new("s3", JobPayload::new("x"))];

    let outcome = orchestrator(backend)
        .run(jobs, &BatchOptions::default(), None)
        .await
        .unwrap();

    let result = &outcome.results[0];
    assert!(result.is_ok());
    assert_eq!(result.attempts, 3);
    assert!(outcome.wall_clock >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn max_delay_caps_backoff_growth() {
    let backend = Arc::new(
        SimulatedBackend::new()
            .with_persistent_failure(&prompt(0), OperationError::Network("reset".into())),
    );
    let policy = RetryPolicy::default()
        .with_max_attempts(5)
        .with_max_delay(Duration::from_secs(2));
    let outcome = orchestrator(backend)
        .run(requests(1), &BatchOptions::default().with_retry(policy), None)
        .await
        .unwrap();

    assert_eq!(outcome.results[0].attempts, 5);
    // 1 + 2 + 2 + 2
    assert!(outcome.wall_clock >= Duration::from_secs(7));
    assert!(outcome.wall_clock < Duration::from_millis(7100));
}

#[tokio::test(start_paused = true)]
async fn attempt_observer_sees_retries_across_jobs() {
    let backend = Arc::new(
        SimulatedBackend::new()
            .with_failures(&prompt(0), vec![OperationError::RateLimited("429".into())])
            .with_failures(&prompt(2), vec![OperationError::RateLimited("429".into()); 2]),
    );
    let records: Arc<Mutex<Vec<AttemptRecord>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = records.clone();
    let observer: Arc<dyn AttemptObserver> =
        Arc::new(move |record: &AttemptRecord| sink.lock().push(record.clone()));

    let outcome = orchestrator(backend)
        .with_attempt_observer(observer)
        .run(requests(3), &BatchOptions::default(), None)
        .await
        .unwrap();

    assert!(outcome.is_complete_success());
    let records = records.lock();
    assert_eq!(records.len(), outcome.total_attempts as usize);
    assert_eq!(records.len(), 2 + 1 + 3);
    let retried: Vec<&AttemptRecord> = records.iter().filter(|r| r.retry_in.is_some()).collect();
    assert_eq!(retried.len(), 3);
    assert!(retried.iter().all(|r| r.error.is_some()));
}
