//! Merge rules: built-in defaults at the bottom of the layer stack.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("batch.max_concurrent", crate::batch::DEFAULT_CONCURRENCY as i64)?
        .set_default("batch.max_attempts", 4)?
        .set_default("batch.base_delay_ms", 1000)?
        .set_default("batch.multiplier", 2.0)?
        .set_default("batch.max_delay_ms", 8000)?
        .set_default("batch.output_dir", "output")?
        .set_default("backend.api_key_env", crate::config::DEFAULT_API_KEY_ENV)?
        .set_default("backend.request_timeout_secs", 120)
}
