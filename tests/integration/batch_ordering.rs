//! Results come back in request order regardless of completion order.

use super::test_utils::{prompt, requests};
use deckhead::backend::SimulatedBackend;
use deckhead::batch::{BatchOptions, BatchOrchestrator, CompletionLog, ProgressObserver};
use deckhead::prompt::PassthroughEnhancer;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn results_follow_request_order_under_shuffled_latencies() {
    let count = 12;
    let mut backend = SimulatedBackend::new();
    for i in 0..count {
        // pseudo-random latencies in 100ms steps
        let latency = Duration::from_millis(((count - i) * 37 % 11 + 1) as u64 * 100);
        backend = backend.with_latency_for(&prompt(i), latency);
    }
    let orchestrator =
        BatchOrchestrator::new(Arc::new(backend)).with_enhancer(Arc::new(PassthroughEnhancer));
    let log = Arc::new(CompletionLog::new());

    let outcome = orchestrator
        .run(
            requests(count),
            &BatchOptions::default().with_concurrency(4),
            Some(log.clone() as Arc<dyn ProgressObserver>),
        )
        .await
        .unwrap();

    assert_eq!(outcome.len(), count);
    for (i, result) in outcome.results.iter().enumerate() {
        assert_eq!(result.id.as_str(), format!("job-{}", i));
        assert_eq!(result.artifact().unwrap().bytes, prompt(i).into_bytes());
    }

    let completion: Vec<String> = log.entries().iter().map(|(id, _)| id.to_string()).collect();
    let request_order: Vec<String> = (0..count).map(|i| format!("job-{}", i)).collect();
    assert_eq!(completion.len(), count);
    assert_ne!(completion, request_order, "latencies should reorder completions");
}

#[tokio::test]
async fn single_job_batch() {
    let orchestrator = BatchOrchestrator::new(Arc::new(SimulatedBackend::new()));
    let outcome = orchestrator
        .run(requests(1), &BatchOptions::default(), None)
        .await
        .unwrap();
    assert_eq!(outcome.len(), 1);
    assert!(outcome.is_complete_success());
    assert_eq!(outcome.total_attempts, 1);
}
