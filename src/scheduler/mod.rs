//! Task Scheduler
//!
//! Single-concurrency job queue. Jobs are submitted without blocking, started
//! one at a time by `tick`, and reported through `poll_completion`. Both calls
//! perform at most one non-blocking check and are meant to be driven from the
//! host loop on a fixed period.
//!
//! At most one job runs at any instant: reduction products of one job are
//! frequently calibration inputs of the next. A job interrupted by
//! `cancel_all` is reported at once, but its thread still counts as running
//! until it exits, so `tick` holds the queue back until then.

pub mod job;
pub mod process;
mod worker;

pub use job::{Completion, Job, JobContext, JobFn, JobOutcome, JobOutput, JobState};
pub use process::{CommandOutput, ExternalCommand};

use crate::error::JobError;
use crate::types::JobId;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use worker::{spawn_worker, WorkerHandle, WorkerMessage};

/// Scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Busy,
}

/// Scheduler statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Number of queued jobs
    pub pending: usize,
    /// Number of jobs currently running (0 or 1)
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// Outcome of `cancel_all`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CancelReport {
    /// Queued jobs dropped without running
    pub discarded: Vec<JobId>,
    /// Job that was running when the cancellation was requested
    pub interrupted: Option<JobId>,
}

pub struct TaskScheduler {
    state: SchedulerState,
    queue: VecDeque<Job>,
    running: Option<WorkerHandle>,
    /// Cancelled job whose thread has not exited yet
    abandoned: Option<WorkerHandle>,
    tx: Sender<WorkerMessage>,
    rx: Receiver<WorkerMessage>,
    /// Completions produced on the scheduler side (cancellations, spawn failures)
    reports: VecDeque<Completion>,
    next_id: JobId,
    stats: SchedulerStats,
}

impl TaskScheduler {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            state: SchedulerState::Idle,
            queue: VecDeque::new(),
            running: None,
            abandoned: None,
            tx,
            rx,
            reports: VecDeque::new(),
            next_id: 1,
            stats: SchedulerStats::default(),
        }
    }

    /// Enqueue a job; never blocks and never runs it inline
    pub fn submit<F>(&mut self, label: impl Into<String>, callable: F) -> JobId
    where
        F: FnOnce(&JobContext) -> Result<JobOutput, JobError> + Send + 'static,
    {
        self.submit_boxed(label, Box::new(callable))
    }

    pub fn submit_boxed(&mut self, label: impl Into<String>, callable: JobFn) -> JobId {
        let id = self.next_id;
        self.next_id += 1;
        let job = Job {
            id,
            label: label.into(),
            callable,
            submitted_at: Utc::now(),
        };
        debug!(job_id = id, label = %job.label, queue_size = self.queue.len() + 1, "Enqueued job");
        self.queue.push_back(job);
        self.stats.pending = self.queue.len();
        id
    }

    /// Start the next queued job if idle; returns the started job id
    pub fn tick(&mut self) -> Option<JobId> {
        if self.state != SchedulerState::Idle || self.queue.is_empty() {
            return None;
        }
        if let Some(handle) = &self.abandoned {
            if !handle.is_finished() {
                debug!(job_id = handle.job_id, "Waiting for cancelled job to exit");
                return None;
            }
            self.abandoned = None;
        }
        let job = self.queue.pop_front()?;
        self.stats.pending = self.queue.len();

        let (id, label, submitted_at) = (job.id, job.label.clone(), job.submitted_at);
        match spawn_worker(job, self.tx.clone()) {
            Ok(handle) => {
                info!(job_id = id, label = %label, "Dispatched job");
                self.running = Some(handle);
                self.state = SchedulerState::Busy;
                self.stats.running = 1;
                Some(id)
            }
            Err(e) => {
                error!(job_id = id, label = %label, error = %e, "Failed to dispatch job");
                self.stats.failed += 1;
                self.reports.push_back(Completion {
                    job_id: id,
                    label,
                    outcome: JobOutcome::Failed(e),
                    submitted_at,
                    finished_at: Utc::now(),
                });
                None
            }
        }
    }

    /// Collect one terminal report, if any, without blocking
    pub fn poll_completion(&mut self) -> Option<Completion> {
        if let Some(report) = self.reports.pop_front() {
            return Some(report);
        }

        loop {
            match self.rx.try_recv() {
                Ok(message) => {
                    if let Some(completion) = self.accept(message) {
                        return Some(completion);
                    }
                }
                Err(TryRecvError::Empty) => break,
                // Unreachable while `self.tx` is alive
                Err(TryRecvError::Disconnected) => break,
            }
        }

        // A worker that exited without posting lost its result
        let lost = self.running.as_ref().is_some_and(|handle| handle.is_finished());
        if lost {
            if let Ok(message) = self.rx.try_recv() {
                return self.accept(message);
            }
            let handle = self.running.take()?;
            error!(job_id = handle.job_id, "Worker exited without reporting");
            self.finish_running();
            self.stats.failed += 1;
            return Some(Completion {
                job_id: handle.job_id,
                label: handle.label,
                outcome: JobOutcome::Failed(JobError::WorkerLost),
                submitted_at: handle.submitted_at,
                finished_at: Utc::now(),
            });
        }
        None
    }

    /// Drop every queued job and interrupt the running one
    pub fn cancel_all(&mut self) -> CancelReport {
        let discarded: Vec<JobId> = self.queue.drain(..).map(|job| job.id).collect();
        self.stats.pending = 0;

        let mut interrupted = None;
        if let Some(handle) = self.running.take() {
            handle.signal_cancel();
            self.stats.cancelled += 1;
            self.reports.push_back(Completion {
                job_id: handle.job_id,
                label: handle.label.clone(),
                outcome: JobOutcome::Cancelled,
                submitted_at: handle.submitted_at,
                finished_at: Utc::now(),
            });
            interrupted = Some(handle.job_id);
            self.abandoned = Some(handle);
        }
        self.finish_running();

        info!(
            discarded = discarded.len(),
            interrupted = ?interrupted,
            "Cancelled all jobs"
        );
        CancelReport {
            discarded,
            interrupted,
        }
    }

    /// Block until a job interrupted by `cancel_all` has exited; false on timeout
    pub fn wait_for_cancelled(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while let Some(handle) = &self.abandoned {
            if handle.is_finished() {
                self.abandoned = None;
                break;
            }
            if Instant::now() >= deadline {
                warn!(job_id = handle.job_id, "Cancelled job is still running");
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        true
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == SchedulerState::Idle
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats.clone()
    }

    /// Turn a worker message for the running job into a completion
    fn accept(&mut self, message: WorkerMessage) -> Option<Completion> {
        let is_current = self
            .running
            .as_ref()
            .is_some_and(|handle| handle.job_id == message.job_id);
        if !is_current {
            // Late result of a job abandoned by cancel_all
            warn!(job_id = message.job_id, "Discarding result of cancelled job");
            return None;
        }
        let handle = self.running.take()?;
        self.finish_running();

        let outcome = match message.result {
            Ok(output) => {
                self.stats.completed += 1;
                info!(job_id = handle.job_id, label = %handle.label, "Job done");
                JobOutcome::Done(output)
            }
            Err(e) => {
                self.stats.failed += 1;
                error!(job_id = handle.job_id, label = %handle.label, error = %e, "Job failed");
                JobOutcome::Failed(e)
            }
        };
        Some(Completion {
            job_id: handle.job_id,
            label: handle.label,
            outcome,
            submitted_at: handle.submitted_at,
            finished_at: message.finished_at,
        })
    }

    fn finish_running(&mut self) {
        self.state = SchedulerState::Idle;
        self.stats.running = 0;
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new()
    }
}
