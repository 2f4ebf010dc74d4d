//! CLI presentation: text and json formatters for batch results.

use crate::batch::{Progress, ProgressObserver};
use crate::error::{BatchError, ErrorKind};
use crate::job::{BatchOutcome, JobResult};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

pub fn format_section_heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

fn format_secs(duration: Duration) -> String {
    format!("{:.1}s", duration.as_secs_f64())
}

fn kind_label(kind: ErrorKind) -> String {
    match kind {
        ErrorKind::Cancelled => format!("{}", kind.yellow()),
        _ => format!("{}", kind.red()),
    }
}

pub fn format_batch_summary_text(outcome: &BatchOutcome, written: &[PathBuf]) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n\n", format_section_heading("Batch summary")));
    let succeeded = format!("{}", outcome.succeeded.green());
    let failed = if outcome.failed == 0 {
        outcome.failed.to_string()
    } else {
        format!("{}", outcome.failed.red())
    };
    out.push_str(&format!("  Jobs: {}\n", outcome.len()));
    out.push_str(&format!("  Succeeded: {}\n", succeeded));
    out.push_str(&format!("  Failed: {}\n", failed));
    out.push_str(&format!("  Attempts: {}\n", outcome.total_attempts));
    out.push_str(&format!(
        "  Elapsed: {} (estimated {})\n",
        format_secs(outcome.wall_clock),
        format_secs(outcome.estimated_duration)
    ));
    if !written.is_empty() {
        out.push_str(&format!("  Artifacts written: {}\n", written.len()));
    }

    let summary = outcome.summary();
    if !summary.failures.is_empty() {
        out.push_str(&format!("\n{}\n\n", format_section_heading("Failed jobs")));
        let mut table = Table::new();
        table.load_preset(UTF8_BORDERS_ONLY);
        table.set_header(vec!["Job", "Kind", "Attempts", "Error"]);
        for failure in &summary.failures {
            table.add_row(vec![
                failure.id.to_string(),
                kind_label(failure.kind),
                failure.attempts.to_string(),
                failure.message.clone(),
            ]);
        }
        out.push_str(&format!("{}\n", table));
    }
    out
}

pub fn format_batch_summary_json(
    outcome: &BatchOutcome,
    written: &[PathBuf],
) -> Result<String, BatchError> {
    let out = json!({
        "summary": outcome.summary(),
        "artifacts": written,
    });
    serde_json::to_string_pretty(&out).map_err(|e| BatchError::Io(e.into()))
}

pub fn format_estimate(count: usize, concurrency: usize, per_job: Duration, estimate: Duration) -> String {
    format!(
        "{} jobs at concurrency {} ({} per job): about {}",
        count,
        concurrency.max(1),
        format_secs(per_job),
        format_secs(estimate)
    )
}

/// Prints one line per finished job to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleProgress;

impl ProgressObserver for ConsoleProgress {
    fn on_batch_started(&self, total: usize, estimate: Duration) {
        eprintln!("Running {} jobs, estimated {}", total, format_secs(estimate));
    }

    fn on_progress(&self, _progress: Progress) {}

    fn on_job_finished(&self, result: &JobResult, progress: Progress) {
        let status = match result.failure() {
            None => format!("{}", "ok".green()),
            Some(failure) => kind_label(failure.kind),
        };
        eprintln!("[{}] {} {}", progress, result.id, status);
    }
}
