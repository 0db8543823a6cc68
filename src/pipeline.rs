//! Reduction Pipeline
//!
//! The reduction itself is an external concern. A closed sequence becomes a
//! [`ReductionRequest`] which a [`ReductionPipeline`] turns into output files
//! on a scheduler worker.

use crate::calibration::CalibrationSet;
use crate::config::PipelineConfig;
use crate::error::{ApiError, JobError};
use crate::scheduler::{ExternalCommand, JobContext, JobOutput};
use crate::sequence::{Sequence, SequenceKind};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const REQUEST_PLACEHOLDER: &str = "{request}";
const OUTPUT_DIR_PLACEHOLDER: &str = "{output_dir}";

/// Everything a reduction needs, serialized for external programs
#[derive(Debug, Clone, Serialize)]
pub struct ReductionRequest {
    pub kind: SequenceKind,
    pub frames: Vec<PathBuf>,
    pub calibrations: CalibrationSet,
    pub output_dir: PathBuf,
}

impl ReductionRequest {
    pub fn from_sequence(
        sequence: &Sequence,
        calibrations: CalibrationSet,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            kind: sequence.kind,
            frames: sequence.frames.iter().map(|f| f.filename.clone()).collect(),
            calibrations,
            output_dir: output_dir.into(),
        }
    }

    /// Short description used as the job label
    pub fn label(&self) -> String {
        let first = self
            .frames
            .first()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        format!("{} x{} ({})", self.kind, self.frames.len(), first)
    }
}

/// Runs on a worker thread; must honor `ctx.is_cancelled()` where it can
pub trait ReductionPipeline: Send + Sync {
    fn reduce(&self, request: &ReductionRequest, ctx: &JobContext)
        -> Result<JobOutput, JobError>;
}

/// Hands the request to an external program
#[derive(Debug, Clone)]
pub struct CommandPipeline {
    program: String,
    args: Vec<String>,
}

impl CommandPipeline {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// None when no reduction program is configured
    pub fn from_config(config: &PipelineConfig) -> Result<Option<Self>, ApiError> {
        match config.command.as_deref().map(str::trim) {
            None => Ok(None),
            Some("") => Err(ApiError::ConfigError(
                "pipeline.command must not be empty".to_string(),
            )),
            Some(program) => Ok(Some(Self::new(program, config.args.clone()))),
        }
    }

    fn request_path(request: &ReductionRequest, ctx: &JobContext) -> PathBuf {
        request
            .output_dir
            .join(format!("{}_{}.request.json", request.kind, ctx.job_id()))
    }

    fn expand_args(&self, request_path: &Path, output_dir: &Path) -> Vec<String> {
        let request = request_path.to_string_lossy();
        let output = output_dir.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace(REQUEST_PLACEHOLDER, &request)
                    .replace(OUTPUT_DIR_PLACEHOLDER, &output)
            })
            .collect()
    }

    fn write_request(path: &Path, request: &ReductionRequest) -> Result<(), JobError> {
        let body = serde_json::to_vec_pretty(request)
            .map_err(|e| JobError::ReductionFailed(format!("Failed to encode request: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                JobError::ReductionFailed(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
        std::fs::write(path, body).map_err(|e| {
            JobError::ReductionFailed(format!("Failed to write {}: {}", path.display(), e))
        })
    }
}

impl ReductionPipeline for CommandPipeline {
    fn reduce(
        &self,
        request: &ReductionRequest,
        ctx: &JobContext,
    ) -> Result<JobOutput, JobError> {
        let request_path = Self::request_path(request, ctx);
        Self::write_request(&request_path, request)?;

        let command = ExternalCommand::new(
            self.program.clone(),
            self.expand_args(&request_path, &request.output_dir),
        )
        .in_dir(&request.output_dir);
        info!(
            job_id = ctx.job_id(),
            program = %self.program,
            kind = %request.kind,
            frames = request.frames.len(),
            "Running reduction"
        );
        let output = command.run(ctx)?;

        let files = produced_files(&output.stdout, &request.output_dir);
        debug!(job_id = ctx.job_id(), outputs = files.len(), "Reduction finished");
        Ok(JobOutput::from_files(files))
    }
}

/// Stdout lines naming existing files, relative lines resolved against `output_dir`
pub fn produced_files(stdout: &str, output_dir: &Path) -> Vec<PathBuf> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let path = Path::new(line);
            let path = if path.is_absolute() {
                path.to_path_buf()
            } else {
                output_dir.join(path)
            };
            if path.is_file() {
                Some(path)
            } else {
                warn!(line = %line, "Ignoring reduction output that is not a file");
                None
            }
        })
        .collect()
}
