//! Runs the compiled `deckhead` binary.

use std::process::Command;
use tempfile::TempDir;

fn deckhead(workspace: &TempDir) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_deckhead"));
    command
        .arg("--workspace")
        .arg(workspace.path())
        .arg("--quiet")
        .env_remove("DECKHEAD_LOG")
        .env_remove("MAX_CONCURRENT_IMAGES");
    command
}

#[test]
fn estimate_prints_rounds_times_per_job() {
    let workspace = TempDir::new().unwrap();
    let output = deckhead(&workspace)
        .args(["estimate", "--count", "10", "--concurrency", "5", "--per-job-secs", "3"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("about 6.0s"), "stdout: {}", stdout);
}

#[test]
fn simulated_run_exits_cleanly_and_writes_artifacts() {
    let workspace = TempDir::new().unwrap();
    std::fs::write(
        workspace.path().join("jobs.json"),
        r#"[{"id": "cover", "prompt": "Harbour at night"}, {"id": "chart", "prompt": "Sales", "kind": "infographic"}]"#,
    )
    .unwrap();

    let output = deckhead(&workspace)
        .args([
            "run",
            "--manifest",
            "jobs.json",
            "--simulate",
            "--simulate-latency-ms",
            "5",
            "--format",
            "json",
        ])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(workspace.path().join("output").join("cover.txt").is_file());
    assert!(workspace.path().join("output").join("chart.txt").is_file());
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["summary"]["succeeded"], 2);
}

#[test]
fn missing_manifest_exits_with_error() {
    let workspace = TempDir::new().unwrap();
    let output = deckhead(&workspace)
        .args(["run", "--manifest", "absent.json", "--simulate"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("absent.json"));
}

#[test]
fn config_command_masks_the_api_key() {
    let workspace = TempDir::new().unwrap();
    std::fs::write(
        workspace.path().join("deckhead.toml"),
        "[backend]\nendpoint = \"https://gen.example.com\"\napi_key = \"sk-live-0123456789\"\n",
    )
    .unwrap();

    let output = deckhead(&workspace).arg("config").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("sk-l...6789"), "stdout: {}", stdout);
    assert!(!stdout.contains("sk-live-0123456789"));
}
