//! The gate caps simultaneous backend calls.

use super::test_utils::requests;
use deckhead::backend::SimulatedBackend;
use deckhead::batch::{BatchOptions, BatchOrchestrator};
use std::sync::Arc;
use std::time::Duration;

async fn run_with_cap(jobs: usize, cap: usize, latency: Duration) -> (Arc<SimulatedBackend>, Duration) {
    let backend = Arc::new(SimulatedBackend::new().with_latency(latency));
    let orchestrator = BatchOrchestrator::new(backend.clone());
    let outcome = orchestrator
        .run(requests(jobs), &BatchOptions::default().with_concurrency(cap), None)
        .await
        .unwrap();
    assert_eq!(outcome.succeeded, jobs);
    (backend, outcome.wall_clock)
}

#[tokio::test(start_paused = true)]
async fn peak_concurrency_never_exceeds_cap() {
    let (backend, wall_clock) = run_with_cap(20, 3, Duration::from_millis(100)).await;
    assert_eq!(backend.peak_concurrency(), 3);
    assert_eq!(backend.active(), 0);
    // ceil(20 / 3) = 7 waves
    assert!(wall_clock >= Duration::from_millis(700));
    assert!(wall_clock < Duration::from_millis(800));
}

#[tokio::test(start_paused = true)]
async fn cap_of_one_runs_sequentially() {
    let (backend, wall_clock) = run_with_cap(4, 1, Duration::from_secs(1)).await;
    assert_eq!(backend.peak_concurrency(), 1);
    assert!(wall_clock >= Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn cap_larger_than_batch_runs_everything_at_once() {
    let (backend, wall_clock) = run_with_cap(3, 10, Duration::from_secs(1)).await;
    assert_eq!(backend.peak_concurrency(), 3);
    assert!(wall_clock < Duration::from_millis(1100));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cap_holds_on_multi_thread_runtime() {
    let (backend, _) = run_with_cap(30, 5, Duration::from_millis(5)).await;
    assert!(backend.peak_concurrency() <= 5);
    assert_eq!(backend.calls(), 30);
}
