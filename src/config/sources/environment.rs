//! Environment variable source: QUICKLOOK_* prefix with __ separator

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::Environment;

/// Add environment variable overlay to builder.
/// Uses QUICKLOOK prefix and __ as separator for nested keys,
/// e.g. `QUICKLOOK__SCHEDULER__TICK_PERIOD_MS`.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let builder = builder.add_source(
        Environment::with_prefix("QUICKLOOK")
            .separator("__")
            .try_parsing(true),
    );
    Ok(builder)
}
