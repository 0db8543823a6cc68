//! Configuration
//!
//! Typed configuration for the quick-look driver, loaded with the `config`
//! crate from defaults, an optional global file, an optional explicit file and
//! `QUICKLOOK__*` environment variables (highest precedence).

mod facade;
mod merge;
mod paths;
mod sources;

pub use facade::ConfigLoader;

use crate::logging::LoggingConfig;
use crate::sequence::DEFAULT_MAX_POINTING_DISTANCE_ARCSEC;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuickLookConfig {
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Incoming frame directories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Directory receiving raw frames
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,

    /// Directory receiving reduction products
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Frame file extensions, without the dot
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Announce frames already present when watching starts
    #[serde(default = "default_true")]
    pub scan_existing: bool,

    /// Suffix of the JSON header sidecar next to each frame
    #[serde(default = "default_header_suffix")]
    pub header_suffix: String,
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("./incoming")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./reduced")
}

fn default_extensions() -> Vec<String> {
    vec!["fits".to_string(), "fit".to_string()]
}

fn default_header_suffix() -> String {
    ".json".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            output_dir: default_output_dir(),
            extensions: default_extensions(),
            scan_existing: default_true(),
            header_suffix: default_header_suffix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Pointing offset that ends a heuristic sequence (arcsec)
    #[serde(default = "default_max_pointing_distance")]
    pub max_pointing_distance_arcsec: f64,
}

fn default_max_pointing_distance() -> f64 {
    DEFAULT_MAX_POINTING_DISTANCE_ARCSEC
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_pointing_distance_arcsec: default_max_pointing_distance(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Driver loop period (milliseconds)
    #[serde(default = "default_tick_period_ms")]
    pub tick_period_ms: u64,
}

fn default_tick_period_ms() -> u64 {
    1000
}

impl SchedulerConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms.max(1))
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: default_tick_period_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Static bad pixel mask
    #[serde(default)]
    pub bpm_path: Option<PathBuf>,
}

/// External reduction program
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Program invoked per sequence; None disables reductions
    #[serde(default)]
    pub command: Option<String>,

    /// Arguments; `{request}` and `{output_dir}` are substituted
    #[serde(default = "default_pipeline_args")]
    pub args: Vec<String>,

    /// Submit dark sequences for master dark creation
    #[serde(default = "default_true")]
    pub reduce_darks: bool,
}

fn default_pipeline_args() -> Vec<String> {
    vec!["{request}".to_string()]
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: default_pipeline_args(),
            reduce_darks: default_true(),
        }
    }
}
