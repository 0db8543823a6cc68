//! MergeService: orchestrates sources, applies merge policy, deserializes to QuickLookConfig.

use crate::config::sources::{environment, global_file};
use crate::config::QuickLookConfig;
use crate::error::ApiError;
use config::File;
use std::path::Path;
use tracing::debug;

use super::builder_with_defaults;

/// Merge service for config composition.
pub struct MergeService;

impl MergeService {
    /// Load config from standard sources.
    /// Precedence: defaults (lowest) -> global file -> environment (highest).
    pub fn load() -> Result<QuickLookConfig, ApiError> {
        let builder = builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = environment::add_to_builder(builder)?;

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Load config from a specific file with environment overlay.
    pub fn load_from_file(path: &Path) -> Result<QuickLookConfig, ApiError> {
        if !path.exists() {
            return Err(ApiError::ConfigError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        debug!(path = %path.display(), "Loading configuration file");

        let builder = builder_with_defaults()?;
        let builder = builder.add_source(File::from(path));
        let builder = environment::add_to_builder(builder)?;

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }
}
