//! ConfigLoader facade delegating to merge service.

use super::merge::service::MergeService;
use super::QuickLookConfig;
use crate::error::ApiError;
use std::path::Path;

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from the global file and environment.
    pub fn load() -> Result<QuickLookConfig, ApiError> {
        MergeService::load()
    }

    /// Load configuration from a specific file with environment overlay.
    pub fn load_from_file(path: &Path) -> Result<QuickLookConfig, ApiError> {
        MergeService::load_from_file(path)
    }

    /// Render a configuration as TOML.
    pub fn to_toml(config: &QuickLookConfig) -> Result<String, ApiError> {
        toml::to_string_pretty(config)
            .map_err(|e| ApiError::ConfigError(format!("Failed to render config: {}", e)))
    }
}
