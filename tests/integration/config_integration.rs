//! Integration tests for the configuration layers feeding a batch.

use super::test_utils::requests;
use deckhead::backend::SimulatedBackend;
use deckhead::batch::BatchOrchestrator;
use deckhead::config::{ConfigLoader, DeckheadConfig};
use deckhead::error::{ErrorKind, OperationError};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn workspace_file_drives_batch_options() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(
        temp_dir.path().join("deckhead.toml"),
        r#"
[batch]
max_concurrent = 2
max_attempts = 2
base_delay_ms = 250
multiplier = 3.0
attempt_timeout_secs = 30
per_job_estimate_secs = 10

[backend]
endpoint = "https://images.example.com/generate"
style_description = "Navy and gold, minimal"

[logging]
level = "debug"
format = "json"
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_with(temp_dir.path(), None, None).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.backend.style_description.as_deref(), Some("Navy and gold, minimal"));

    let options = config.batch.to_options();
    assert_eq!(options.concurrency, 2);
    assert_eq!(options.retry.max_attempts, 2);
    assert_eq!(options.retry.base_delay, Duration::from_millis(250));
    assert_eq!(options.retry.backoff_delay(2), Duration::from_millis(750));
    assert_eq!(options.retry.attempt_timeout, Some(Duration::from_secs(30)));
    assert_eq!(options.per_job_estimate, Duration::from_secs(10));
}

#[test]
fn explicit_file_overrides_workspace_file() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(
        temp_dir.path().join("deckhead.toml"),
        "[batch]\nmax_concurrent = 2\nmax_attempts = 3\n",
    )
    .unwrap();
    let extra = temp_dir.path().join("ci.toml");
    std::fs::write(&extra, "[batch]\nmax_concurrent = 8\n").unwrap();

    let config = ConfigLoader::load_with(temp_dir.path(), None, Some(&extra)).unwrap();
    assert_eq!(config.batch.max_concurrent, 8);
    assert_eq!(config.batch.max_attempts, 3);
}

#[test]
fn malformed_file_is_a_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("broken.toml");
    std::fs::write(&file, "[batch\nmax_concurrent = ").unwrap();
    let err = ConfigLoader::load_from_file(&file).unwrap_err();
    assert!(err.to_string().starts_with("Configuration error"));
}

#[test]
fn wrong_type_is_a_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("typed.toml");
    std::fs::write(&file, "[batch]\nmax_attempts = \"lots\"\n").unwrap();
    assert!(ConfigLoader::load_from_file(&file).is_err());
}

#[tokio::test(start_paused = true)]
async fn configured_policy_applies_to_run() {
    let mut config = DeckheadConfig::default();
    config.batch.max_attempts = 2;
    config.batch.base_delay_ms = 500;
    let backend = Arc::new(
        SimulatedBackend::new()
            .with_persistent_failure("<job-0>", OperationError::Unavailable("503".into())),
    );

    let outcome = BatchOrchestrator::new(backend)
        .run(requests(2), &config.batch.to_options(), None)
        .await
        .unwrap();

    assert_eq!(outcome.results[0].attempts, 2);
    assert_eq!(outcome.results[0].error_kind(), Some(ErrorKind::Exhausted));
    assert!(outcome.results[1].is_ok());
    assert!(outcome.wall_clock >= Duration::from_millis(500));
}
