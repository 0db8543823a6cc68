//! Global file source: `$XDG_CONFIG_HOME/quicklook/config.toml`, optional.

use crate::config::paths::xdg_root;
use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File};

/// Add the global config file to the builder when the location is resolvable.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    match xdg_root::global_config_path() {
        Ok(path) => Ok(builder.add_source(File::from(path).required(false))),
        Err(_) => Ok(builder),
    }
}
