//! Merge policy and service for configuration sources.

pub mod service;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Builder seeded with the defaults every other source overrides.
pub(crate) fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("scheduler.tick_period_ms", 1000)?
        .set_default("detector.max_pointing_distance_arcsec", 1000.0)?
        .set_default("watch.scan_existing", true)?
        .set_default("pipeline.reduce_darks", true)
}
