//! Property-based tests for backoff, estimates and batch ordering

use deckhead::backend::SimulatedBackend;
use deckhead::batch::{BatchOptions, BatchOrchestrator, RetryPolicy};
use deckhead::job::{JobPayload, JobRequest};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

const SLACK: Duration = Duration::from_micros(1);

proptest! {
    #[test]
    fn backoff_is_monotonic_and_capped(
        base_ms in 1u64..5_000,
        multiplier in 1.0f64..4.0,
        cap_ms in 1u64..60_000,
        attempts in 2u32..12,
    ) {
        let policy = RetryPolicy::default()
            .with_base_delay(Duration::from_millis(base_ms))
            .with_multiplier(multiplier)
            .with_max_delay(Duration::from_millis(cap_ms));

        let delays: Vec<Duration> = (1..attempts).map(|a| policy.backoff_delay(a)).collect();
        for pair in delays.windows(2) {
            prop_assert!(pair[0] <= pair[1]);
        }
        for delay in &delays {
            prop_assert!(*delay <= Duration::from_millis(cap_ms));
        }
        let first = Duration::from_millis(base_ms.min(cap_ms));
        prop_assert!(delays[0] + SLACK >= first && delays[0] <= first + SLACK);
    }

    #[test]
    fn jitter_stays_within_factor(
        base_ms in 1u64..5_000,
        jitter in 0.0f64..0.99,
        attempt in 1u32..8,
        seed in any::<u64>(),
    ) {
        let policy = RetryPolicy::default()
            .with_base_delay(Duration::from_millis(base_ms))
            .with_jitter(jitter);
        let plain = policy.backoff_delay(attempt);
        let jittered = policy.jittered_delay(attempt, seed);

        prop_assert!(jittered + SLACK >= plain);
        prop_assert!(jittered <= plain.mul_f64(1.0 + jitter) + SLACK);
        prop_assert_eq!(jittered, policy.jittered_delay(attempt, seed));
    }

    #[test]
    fn estimate_matches_rounds(
        count in 0usize..500,
        concurrency in 1usize..64,
        per_job_ms in 0u64..10_000,
    ) {
        let per_job = Duration::from_millis(per_job_ms);
        let estimate = BatchOrchestrator::estimate_duration(count, concurrency, per_job);

        let lower = per_job * (count / concurrency) as u32;
        let upper = per_job * (count / concurrency + 1) as u32;
        prop_assert!(estimate >= lower);
        prop_assert!(estimate <= upper);
        if count % concurrency == 0 {
            prop_assert_eq!(estimate, lower);
        }
    }
}

/// Ordering and the concurrency cap hold for arbitrary latencies
#[test]
fn results_follow_request_order_under_random_latency() {
    let mut runner = proptest::test_runner::TestRunner::new(proptest::test_runner::Config {
        cases: 24,
        ..Default::default()
    });

    runner
        .run(
            &(prop::collection::vec(0u64..500, 1..24), 1usize..6),
            |(latencies, cap)| {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .start_paused(true)
                    .build()
                    .unwrap();

                let mut backend = SimulatedBackend::new();
                let mut requests = Vec::with_capacity(latencies.len());
                for (i, latency) in latencies.iter().enumerate() {
                    let prompt = format!("<job-{}>", i);
                    backend = backend.with_latency_for(&prompt, Duration::from_millis(*latency));
                    requests.push(JobRequest::new(format!("job-{}", i), JobPayload::new(prompt)));
                }
                let backend = Arc::new(backend);
                let options = BatchOptions::default().with_concurrency(cap);

                let outcome = runtime
                    .block_on(BatchOrchestrator::new(backend.clone()).run(requests, &options, None))
                    .unwrap();

                prop_assert_eq!(outcome.len(), latencies.len());
                for (i, result) in outcome.results.iter().enumerate() {
                    prop_assert_eq!(result.id.as_str(), format!("job-{}", i));
                    prop_assert!(result.is_ok());
                }
                prop_assert!(backend.peak_concurrency() <= cap);
                prop_assert_eq!(backend.calls(), latencies.len());
                Ok(())
            },
        )
        .unwrap();
}
