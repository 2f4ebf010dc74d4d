//! Configuration System
//!
//! Layered configuration for batch limits, retry policy, backend connection and logging.
//! Later layers override earlier ones: built-in defaults, the global user file, workspace
//! files, an explicit `--config` file, `DECKHEAD__SECTION__KEY` environment variables,
//! and finally the legacy `MAX_CONCURRENT_IMAGES` variable.

use crate::backend::HttpBackend;
use crate::batch::{BatchOptions, RetryPolicy};
use crate::error::BatchError;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

mod merge {
    pub mod merge_policy;
}
mod sources {
    pub mod environment;
    pub mod global_file;
    pub mod workspace_file;
}

pub use sources::global_file::global_config_path;

/// Environment variable consulted for the backend key when `backend.api_key` is unset.
pub const DEFAULT_API_KEY_ENV: &str = "DECKHEAD_API_KEY";

/// Minimum accepted API key length.
const MIN_API_KEY_LEN: usize = 10;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeckheadConfig {
    #[serde(default)]
    pub batch: BatchSettings,

    #[serde(default)]
    pub backend: BackendSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Batch limits and retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSettings {
    /// Maximum simultaneous backend calls (floor 1)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: Option<u64>,

    #[serde(default)]
    pub jitter: f64,

    /// Per-attempt timeout; unset means no timeout beyond the HTTP client's own.
    #[serde(default)]
    pub attempt_timeout_secs: Option<u64>,

    /// Per-job duration used for the up-front estimate
    #[serde(default = "default_per_job_estimate_secs")]
    pub per_job_estimate_secs: u64,

    /// Where `deckhead run` writes artifacts when `--output-dir` is not given
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_max_concurrent() -> usize {
    crate::batch::DEFAULT_CONCURRENCY
}

fn default_max_attempts() -> u32 {
    4
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> Option<u64> {
    Some(8000)
}

fn default_per_job_estimate_secs() -> u64 {
    crate::batch::DEFAULT_PER_JOB_ESTIMATE.as_secs()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            jitter: 0.0,
            attempt_timeout_secs: None,
            per_job_estimate_secs: default_per_job_estimate_secs(),
            output_dir: default_output_dir(),
        }
    }
}

impl BatchSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            multiplier: self.multiplier,
            max_delay: self.max_delay_ms.map(Duration::from_millis),
            jitter: self.jitter,
            attempt_timeout: self.attempt_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn to_options(&self) -> BatchOptions {
        BatchOptions {
            concurrency: self.max_concurrent,
            retry: self.retry_policy(),
            per_job_estimate: Duration::from_secs(self.per_job_estimate_secs),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent == 0 {
            return Err("max_concurrent must be at least 1".to_string());
        }
        self.retry_policy().validate().map_err(|e| e.to_string())
    }
}

/// Remote backend connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Generation endpoint URL; required unless running with `--simulate`
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable holding the key when `api_key` is unset
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Brand style description appended to every prompt
    #[serde(default)]
    pub style_description: Option<String>,
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            api_key_env: default_api_key_env(),
            request_timeout_secs: default_request_timeout_secs(),
            style_description: None,
        }
    }
}

impl BackendSettings {
    /// Configured key, falling back to the `api_key_env` variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|key| !key.is_empty())
    }

    /// Key shown as `abcd...wxyz`, or `****` when short or unset.
    pub fn masked_api_key(&self) -> String {
        match self.resolve_api_key() {
            Some(key) if key.chars().count() > 8 => {
                let chars: Vec<char> = key.chars().collect();
                let head: String = chars[..4].iter().collect();
                let tail: String = chars[chars.len() - 4..].iter().collect();
                format!("{}...{}", head, tail)
            }
            _ => "****".to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(endpoint) = &self.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(format!("endpoint must be an http(s) URL, got '{}'", endpoint));
            }
        }
        if let Some(key) = &self.api_key {
            if key.len() < MIN_API_KEY_LEN {
                return Err(format!(
                    "api_key must be at least {} characters",
                    MIN_API_KEY_LEN
                ));
            }
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be greater than zero".to_string());
        }
        Ok(())
    }

    pub fn to_backend(&self) -> Result<HttpBackend, BatchError> {
        let endpoint = self.endpoint.clone().ok_or_else(|| {
            BatchError::Config("backend.endpoint is not set (use --simulate for a dry run)".to_string())
        })?;
        HttpBackend::new(
            endpoint,
            self.resolve_api_key(),
            Some(Duration::from_secs(self.request_timeout_secs)),
        )
        .map_err(|e| BatchError::Config(e.to_string()))
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Batch(String),
    Backend(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Batch(msg) => write!(f, "batch: {}", msg),
            ValidationError::Backend(msg) => write!(f, "backend: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl DeckheadConfig {
    /// Validate the entire configuration, collecting every problem.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        if let Err(e) = self.batch.validate() {
            errors.push(ValidationError::Batch(e));
        }
        if let Err(e) = self.backend.validate() {
            errors.push(ValidationError::Backend(e));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Render as TOML with the API key masked.
    pub fn to_display_toml(&self) -> Result<String, BatchError> {
        let mut shown = self.clone();
        if shown.backend.api_key.is_some() {
            shown.backend.api_key = Some(self.backend.masked_api_key());
        }
        toml::to_string_pretty(&shown).map_err(|e| BatchError::Config(e.to_string()))
    }

    fn apply_floor(&mut self) {
        if self.batch.max_concurrent == 0 {
            warn!("batch.max_concurrent was 0, using 1");
            self.batch.max_concurrent = 1;
        }
    }
}

/// Loads [`DeckheadConfig`] from its layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load with the user's global file and the workspace files.
    pub fn load(workspace_root: &Path) -> Result<DeckheadConfig, BatchError> {
        Self::load_with(workspace_root, global_config_path().as_deref(), None)
    }

    /// Load with an explicit global file path and optional extra file.
    ///
    /// `extra` is layered after the workspace files and must exist.
    pub fn load_with(
        workspace_root: &Path,
        global_file: Option<&Path>,
        extra: Option<&Path>,
    ) -> Result<DeckheadConfig, BatchError> {
        let mut builder = merge::merge_policy::builder_with_defaults()?;
        builder = sources::global_file::add_to_builder(builder, global_file)?;
        builder = sources::workspace_file::add_to_builder(builder, workspace_root)?;
        if let Some(path) = extra {
            if !path.exists() {
                return Err(BatchError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = sources::environment::add_to_builder(builder)?;

        let mut loaded: DeckheadConfig = builder.build()?.try_deserialize()?;
        loaded.apply_floor();
        debug!(
            workspace = %workspace_root.display(),
            max_concurrent = loaded.batch.max_concurrent,
            max_attempts = loaded.batch.max_attempts,
            "Configuration loaded"
        );
        Ok(loaded)
    }

    /// Load a single TOML file over the defaults, ignoring every other layer.
    pub fn load_from_file(path: &Path) -> Result<DeckheadConfig, BatchError> {
        let mut loaded: DeckheadConfig = merge::merge_policy::builder_with_defaults()?
            .add_source(config::File::from(path).required(true))
            .build()?
            .try_deserialize()?;
        loaded.apply_floor();
        Ok(loaded)
    }
}

/// Serializes tests that read or write process environment variables.
#[cfg(test)]
pub(crate) static ENV_MUTEX: parking_lot::Mutex<()> = parking_lot::Mutex::new(());
