//! CLI route: single dispatch from parsed commands to the batch core.

use crate::backend::{GenerationBackend, SimulatedBackend};
use crate::batch::{BatchOptions, BatchOrchestrator, ProgressObserver};
use crate::cli::manifest::load_manifest;
use crate::cli::output::{write_artifacts, CommandOutput, EXIT_JOB_FAILURES};
use crate::cli::parse::{Commands, OutputFormat};
use crate::cli::presentation::{
    format_batch_summary_json, format_batch_summary_text, format_estimate, ConsoleProgress,
};
use crate::config::{global_config_path, ConfigLoader, DeckheadConfig};
use crate::error::BatchError;
use crate::prompt::StyleEnhancer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Runtime context for CLI execution: workspace and effective configuration.
pub struct RunContext {
    workspace_root: PathBuf,
    config: DeckheadConfig,
}

impl RunContext {
    /// Load and validate configuration for `workspace_root`.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, BatchError> {
        let config = ConfigLoader::load_with(
            &workspace_root,
            global_config_path().as_deref(),
            config_path.as_deref(),
        )?;
        Self::from_config(workspace_root, config)
    }

    pub fn from_config(workspace_root: PathBuf, config: DeckheadConfig) -> Result<Self, BatchError> {
        config.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            BatchError::Config(format!("validation failed:\n{}", messages.join("\n")))
        })?;
        Ok(Self {
            workspace_root,
            config,
        })
    }

    pub fn config(&self) -> &DeckheadConfig {
        &self.config
    }

    pub fn execute(&self, command: &Commands) -> Result<CommandOutput, BatchError> {
        match command {
            Commands::Run {
                manifest,
                output_dir,
                concurrency,
                simulate,
                simulate_latency_ms,
                format,
            } => {
                let backend: Arc<dyn GenerationBackend> = if *simulate {
                    Arc::new(
                        SimulatedBackend::new()
                            .with_latency(Duration::from_millis(*simulate_latency_ms)),
                    )
                } else {
                    Arc::new(self.config.backend.to_backend()?)
                };
                let output_dir = output_dir
                    .clone()
                    .unwrap_or_else(|| self.resolve(&self.config.batch.output_dir));
                self.run_batch(backend, manifest, &output_dir, *concurrency, *format)
            }
            Commands::Estimate {
                count,
                concurrency,
                per_job_secs,
            } => {
                let concurrency = concurrency.unwrap_or(self.config.batch.max_concurrent);
                let per_job = Duration::from_secs(
                    per_job_secs.unwrap_or(self.config.batch.per_job_estimate_secs),
                );
                let estimate = BatchOrchestrator::estimate_duration(*count, concurrency, per_job);
                Ok(CommandOutput::success(format_estimate(
                    *count,
                    concurrency,
                    per_job,
                    estimate,
                )))
            }
            Commands::Config => Ok(CommandOutput::success(self.config.to_display_toml()?)),
        }
    }

    /// Run a manifest against `backend` and write artifacts into `output_dir`.
    pub fn run_batch(
        &self,
        backend: Arc<dyn GenerationBackend>,
        manifest: &Path,
        output_dir: &Path,
        concurrency: Option<usize>,
        format: OutputFormat,
    ) -> Result<CommandOutput, BatchError> {
        let requests = load_manifest(&self.resolve(manifest))?;
        let options = self.batch_options(concurrency);

        let mut enhancer = StyleEnhancer::new();
        if let Some(description) = &self.config.backend.style_description {
            enhancer = enhancer.with_style_description(description.clone());
        }
        let orchestrator = BatchOrchestrator::new(backend).with_enhancer(Arc::new(enhancer));
        let observer: Option<Arc<dyn ProgressObserver>> = match format {
            OutputFormat::Text => Some(Arc::new(ConsoleProgress)),
            OutputFormat::Json => None,
        };

        let runtime = tokio::runtime::Runtime::new()?;
        let outcome = runtime.block_on(async {
            let cancel = CancellationToken::new();
            let interrupt = cancel.clone();
            let watcher = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, cancelling batch");
                    interrupt.cancel();
                }
            });
            let outcome = orchestrator
                .run_with_cancellation(requests, &options, observer, cancel)
                .await;
            watcher.abort();
            outcome
        })?;

        let written = write_artifacts(&outcome, &self.resolve(output_dir))?;
        info!(
            artifacts = written.len(),
            output_dir = %output_dir.display(),
            "Batch artifacts written"
        );

        let text = match format {
            OutputFormat::Text => format_batch_summary_text(&outcome, &written),
            OutputFormat::Json => format_batch_summary_json(&outcome, &written)?,
        };
        let exit_code = if outcome.is_complete_success() {
            0
        } else {
            EXIT_JOB_FAILURES
        };
        Ok(CommandOutput { text, exit_code })
    }

    fn batch_options(&self, concurrency: Option<usize>) -> BatchOptions {
        let mut options = self.config.batch.to_options();
        if let Some(concurrency) = concurrency {
            options.concurrency = concurrency;
        }
        options
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        }
    }
}
