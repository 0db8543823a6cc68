//! Quick-look driver
//!
//! Owns both metadata stores, the sequence detector, the calibration selector,
//! the scheduler and the reduction pipeline. The host loop feeds it file
//! notifications and calls [`QuickLookDriver::tick`] on a fixed period.

use crate::calibration::{CalibrationSelector, CalibrationSet};
use crate::config::QuickLookConfig;
use crate::error::{ApiError, JobError, StoreError};
use crate::pipeline::{CommandPipeline, ReductionPipeline, ReductionRequest};
use crate::scheduler::{CancelReport, Completion, JobOutcome, TaskScheduler};
use crate::sequence::{DetectionOutcome, Sequence, SequenceDetector, SequenceKind};
use crate::store::{HeaderReader, MemoryStore, MetadataStore, SidecarHeaderReader};
use crate::types::JobId;
use crate::watch::{scan_existing, FileNotification, FrameFileFilter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How long shutdown waits for an interrupted job to kill its child processes
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Completion of a reduction as seen by the host loop
#[derive(Debug, Clone)]
pub struct JobReport {
    pub completion: Completion,
    /// Produced files that were added to the output store
    pub indexed: Vec<PathBuf>,
}

impl JobReport {
    pub fn job_id(&self) -> JobId {
        self.completion.job_id
    }

    pub fn error(&self) -> Option<&JobError> {
        match &self.completion.outcome {
            JobOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

pub struct QuickLookDriver {
    inputs: Arc<MemoryStore>,
    outputs: Arc<MemoryStore>,
    detector: SequenceDetector,
    selector: CalibrationSelector,
    scheduler: TaskScheduler,
    pipeline: Option<Arc<dyn ReductionPipeline>>,
    output_dir: PathBuf,
    reduce_darks: bool,
}

impl QuickLookDriver {
    pub fn new(
        config: &QuickLookConfig,
        reader: Arc<dyn HeaderReader>,
        pipeline: Option<Arc<dyn ReductionPipeline>>,
    ) -> Self {
        let inputs = Arc::new(MemoryStore::new("inputs", Arc::clone(&reader)));
        let outputs = Arc::new(MemoryStore::new("outputs", reader));
        let selector = CalibrationSelector::new(
            Arc::clone(&inputs) as Arc<dyn MetadataStore>,
            Arc::clone(&outputs) as Arc<dyn MetadataStore>,
            config.calibration.bpm_path.clone(),
        );
        Self {
            inputs,
            outputs,
            detector: SequenceDetector::new(config.detector.max_pointing_distance_arcsec),
            selector,
            scheduler: TaskScheduler::new(),
            pipeline,
            output_dir: config.watch.output_dir.clone(),
            reduce_darks: config.pipeline.reduce_darks,
        }
    }

    /// Sidecar headers and the configured external program
    pub fn from_config(config: &QuickLookConfig) -> Result<Self, ApiError> {
        let reader: Arc<dyn HeaderReader> =
            Arc::new(SidecarHeaderReader::new(config.watch.header_suffix.clone()));
        let pipeline = CommandPipeline::from_config(&config.pipeline)?
            .map(|p| Arc::new(p) as Arc<dyn ReductionPipeline>);
        if pipeline.is_none() {
            warn!("No reduction program configured; closed sequences will only be logged");
        }
        Ok(Self::new(config, reader, pipeline))
    }

    /// Apply one watcher notification; returns the detector outcome for arrivals
    pub fn handle_notification(
        &mut self,
        notification: FileNotification,
    ) -> Result<Option<DetectionOutcome>, ApiError> {
        match notification {
            FileNotification::Arrived(path) => self.frame_arrived(&path),
            FileNotification::Removed(path) => {
                if self.inputs.delete(&path)? {
                    info!(filename = %path.display(), "Frame removed");
                }
                Ok(None)
            }
            FileNotification::Refresh(_) => {
                debug!(
                    inputs = self.inputs.len(),
                    outputs = self.outputs.len(),
                    open = self.detector.current_frames().len(),
                    "Refresh"
                );
                Ok(None)
            }
        }
    }

    fn frame_arrived(&mut self, path: &Path) -> Result<Option<DetectionOutcome>, ApiError> {
        if !self.inputs.insert(path)? {
            debug!(filename = %path.display(), "Frame already registered");
            return Ok(None);
        }
        let Some(frame) = self.inputs.file_info(path)? else {
            return Ok(None);
        };
        let outcome = self.detector.on_frame_arrived(frame);
        if outcome.closed {
            if let Err(e) = self.submit_sequence(&outcome.sequence) {
                error!(
                    kind = %outcome.sequence.kind,
                    frames = outcome.sequence.len(),
                    error = %e,
                    "Dropping closed sequence"
                );
                return Err(e);
            }
        }
        Ok(Some(outcome))
    }

    /// Queue the reduction of a closed sequence
    pub fn submit_sequence(&mut self, sequence: &Sequence) -> Result<Option<JobId>, ApiError> {
        let Some(pipeline) = self.pipeline.clone() else {
            info!(kind = %sequence.kind, frames = sequence.len(), "Sequence ready, no pipeline");
            return Ok(None);
        };
        if sequence.is_empty() {
            return Ok(None);
        }

        let calibrations = if sequence.kind == SequenceKind::Dark {
            if !self.reduce_darks {
                info!(frames = sequence.len(), "Skipping dark sequence");
                return Ok(None);
            }
            CalibrationSet::default()
        } else {
            self.selector.select_for_frames(&sequence.frames)?
        };

        let request = ReductionRequest::from_sequence(sequence, calibrations, &self.output_dir);
        let label = request.label();
        let job_id = self
            .scheduler
            .submit(label.clone(), move |ctx| pipeline.reduce(&request, ctx));
        info!(job_id, label = %label, "Submitted reduction");
        Ok(Some(job_id))
    }

    /// Start a queued job if idle and collect one completion
    pub fn tick(&mut self) -> Option<JobReport> {
        self.scheduler.tick();
        let completion = self.scheduler.poll_completion()?;

        let mut indexed = Vec::new();
        match &completion.outcome {
            JobOutcome::Done(output) => {
                for file in output.files() {
                    match self.outputs.insert(&file) {
                        Ok(true) => indexed.push(file),
                        Ok(false) => debug!(filename = %file.display(), "Output already indexed"),
                        Err(e) => warn!(filename = %file.display(), error = %e, "Failed to index output"),
                    }
                }
                info!(job_id = completion.job_id, outputs = indexed.len(), "Reduction done");
            }
            JobOutcome::Failed(e) => {
                error!(job_id = completion.job_id, label = %completion.label, error = %e, "Reduction failed");
            }
            JobOutcome::Cancelled => {
                info!(job_id = completion.job_id, "Reduction cancelled");
            }
        }
        Some(JobReport {
            completion,
            indexed,
        })
    }

    /// Index products already present in the output directory
    pub fn index_outputs(&self, filter: &FrameFileFilter) -> Result<usize, StoreError> {
        index_directory(self.outputs.as_ref(), &self.output_dir, filter)
    }

    /// Cancel everything and give the interrupted job time to exit; the open
    /// sequence is left as is
    pub fn shutdown(&mut self) -> CancelReport {
        let report = self.scheduler.cancel_all();
        if report.interrupted.is_some() {
            self.scheduler.wait_for_cancelled(SHUTDOWN_GRACE);
        }
        report
    }

    pub fn inputs(&self) -> &Arc<MemoryStore> {
        &self.inputs
    }

    pub fn outputs(&self) -> &Arc<MemoryStore> {
        &self.outputs
    }

    pub fn detector(&self) -> &SequenceDetector {
        &self.detector
    }

    pub fn selector(&self) -> &CalibrationSelector {
        &self.selector
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }
}

/// Register every frame under `dir` with its sidecar; unreadable headers are skipped
pub fn index_directory(
    store: &dyn MetadataStore,
    dir: &Path,
    filter: &FrameFileFilter,
) -> Result<usize, StoreError> {
    if !dir.is_dir() {
        return Ok(0);
    }
    let mut count = 0;
    for notification in scan_existing(dir, filter) {
        if let FileNotification::Arrived(path) = notification {
            match store.insert(&path) {
                Ok(true) => count += 1,
                Ok(false) => {}
                Err(e) => warn!(filename = %path.display(), error = %e, "Skipping frame"),
            }
        }
    }
    debug!(dir = ?dir, count, "Indexed directory");
    Ok(count)
}
