//! Environment sources: `DECKHEAD__SECTION__KEY` and the legacy `MAX_CONCURRENT_IMAGES`.

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::Environment;
use tracing::warn;

const LEGACY_CONCURRENCY_VAR: &str = "MAX_CONCURRENT_IMAGES";

pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let mut builder = builder.add_source(
        Environment::with_prefix("DECKHEAD")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    if let Ok(raw) = std::env::var(LEGACY_CONCURRENCY_VAR) {
        match raw.trim().parse::<i64>() {
            Ok(value) => {
                if value < 1 {
                    warn!(
                        variable = LEGACY_CONCURRENCY_VAR,
                        value,
                        "Concurrency below 1, using 1"
                    );
                }
                builder = builder.set_override("batch.max_concurrent", value.max(1))?;
            }
            Err(_) => {
                warn!(
                    variable = LEGACY_CONCURRENCY_VAR,
                    value = %raw,
                    "Ignoring unparseable concurrency override"
                );
            }
        }
    }

    Ok(builder)
}
