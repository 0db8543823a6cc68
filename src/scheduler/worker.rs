//! Isolated job worker
//!
//! Each dispatched job runs on its own named OS thread. Panics are caught on
//! that thread and the result travels back over the completion channel as a
//! plain `Result`, so nothing unwinds into the scheduler.

use super::job::{Job, JobContext, JobOutput};
use crate::error::JobError;
use crate::types::JobId;
use chrono::{DateTime, Utc};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, warn};

/// Message a worker posts when its job ends
#[derive(Debug)]
pub(crate) struct WorkerMessage {
    pub(crate) job_id: JobId,
    pub(crate) result: Result<JobOutput, JobError>,
    pub(crate) finished_at: DateTime<Utc>,
}

/// Scheduler-side handle of the running job
pub(crate) struct WorkerHandle {
    pub(crate) job_id: JobId,
    pub(crate) label: String,
    pub(crate) submitted_at: DateTime<Utc>,
    cancelled: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl WorkerHandle {
    /// Ask the job to stop; cooperative callables and child processes honor it
    pub(crate) fn signal_cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

/// Start `job` on a dedicated thread reporting to `tx`
pub(crate) fn spawn_worker(job: Job, tx: Sender<WorkerMessage>) -> Result<WorkerHandle, JobError> {
    let Job {
        id,
        label,
        callable,
        submitted_at,
    } = job;
    let cancelled = Arc::new(AtomicBool::new(false));
    let context = JobContext::new(id, Arc::clone(&cancelled));

    let thread = std::thread::Builder::new()
        .name(format!("quicklook-job-{}", id))
        .spawn(move || {
            debug!(job_id = id, "Worker started");
            let result = match panic::catch_unwind(AssertUnwindSafe(|| callable(&context))) {
                Ok(result) => result,
                Err(payload) => Err(JobError::Panicked(panic_message(payload.as_ref()))),
            };
            let message = WorkerMessage {
                job_id: id,
                result,
                finished_at: Utc::now(),
            };
            if tx.send(message).is_err() {
                warn!(job_id = id, "Scheduler dropped before job finished");
            }
            debug!(job_id = id, "Worker stopped");
        })
        .map_err(|e| JobError::SpawnFailed {
            program: "worker thread".to_string(),
            message: e.to_string(),
        })?;

    Ok(WorkerHandle {
        job_id: id,
        label,
        submitted_at,
        cancelled,
        thread,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
