//! Error types for the quick-look orchestration layer.

use std::path::PathBuf;
use thiserror::Error;

/// Metadata store and header access errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read header for {path}: {message}")]
    HeaderUnreadable { path: PathBuf, message: String },

    #[error("Invalid header metadata in {path}: {message}")]
    InvalidMetadata { path: PathBuf, message: String },

    /// Sidecar is empty or truncated, typically still being written
    #[error("Header {path} is incomplete")]
    IncompleteHeader { path: PathBuf },
}

/// Errors raised by a reduction job and carried back over the completion channel
#[derive(Debug, Clone, Error, PartialEq)]
pub enum JobError {
    #[error("Reduction failed: {0}")]
    ReductionFailed(String),

    #[error("Job panicked: {0}")]
    Panicked(String),

    #[error("Failed to spawn {program}: {message}")]
    SpawnFailed { program: String, message: String },

    #[error("{program} exited with status {code:?}: {stderr}")]
    ProcessFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Worker disconnected before reporting a result")]
    WorkerLost,

    #[error("Job interrupted by cancellation")]
    Interrupted,
}

/// Top-level error for driver, configuration and tooling operations
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Storage error: {0}")]
    StorageError(#[from] StoreError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Watch error: {0}")]
    WatchError(String),

    #[error("Pipeline error: {0}")]
    PipelineError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}

impl From<notify::Error> for ApiError {
    fn from(err: notify::Error) -> Self {
        ApiError::WatchError(err.to_string())
    }
}
