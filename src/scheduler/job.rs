//! Job model
//!
//! A job is an opaque callable with its arguments captured, plus the
//! bookkeeping the scheduler reports back once it reaches a terminal state.

use crate::error::JobError;
use crate::types::JobId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Callable executed on the worker
pub type JobFn = Box<dyn FnOnce(&JobContext) -> Result<JobOutput, JobError> + Send + 'static>;

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    Queued,
    Running,
    Done,
    Failed,
    Cancelled,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Done => "done",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Value produced by a successful job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum JobOutput {
    /// Completed without a result
    Nothing,
    File(PathBuf),
    Files(Vec<PathBuf>),
    Message(String),
}

impl JobOutput {
    /// Produced files, to be indexed by the caller
    pub fn files(&self) -> Vec<PathBuf> {
        match self {
            JobOutput::File(path) => vec![path.clone()],
            JobOutput::Files(paths) => paths.clone(),
            JobOutput::Nothing | JobOutput::Message(_) => Vec::new(),
        }
    }

    /// Normalize a list of outputs: empty, single file or many files
    pub fn from_files(mut files: Vec<PathBuf>) -> Self {
        match files.len() {
            0 => JobOutput::Nothing,
            1 => JobOutput::File(files.remove(0)),
            _ => JobOutput::Files(files),
        }
    }
}

/// Handle the callable uses to observe cancellation
#[derive(Debug, Clone)]
pub struct JobContext {
    job_id: JobId,
    cancelled: Arc<AtomicBool>,
}

impl JobContext {
    pub(crate) fn new(job_id: JobId, cancelled: Arc<AtomicBool>) -> Self {
        Self { job_id, cancelled }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Queued unit of work
pub struct Job {
    pub(crate) id: JobId,
    pub(crate) label: String,
    pub(crate) callable: JobFn,
    pub(crate) submitted_at: DateTime<Utc>,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("submitted_at", &self.submitted_at)
            .finish_non_exhaustive()
    }
}

/// Terminal outcome of a job
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Done(JobOutput),
    Failed(JobError),
    /// Interrupted by `cancel_all`; never carries partial results
    Cancelled,
}

impl JobOutcome {
    pub fn state(&self) -> JobState {
        match self {
            JobOutcome::Done(_) => JobState::Done,
            JobOutcome::Failed(_) => JobState::Failed,
            JobOutcome::Cancelled => JobState::Cancelled,
        }
    }
}

/// Report delivered by `TaskScheduler::poll_completion`
#[derive(Debug, Clone)]
pub struct Completion {
    pub job_id: JobId,
    pub label: String,
    pub outcome: JobOutcome,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl Completion {
    pub fn state(&self) -> JobState {
        self.outcome.state()
    }
}
