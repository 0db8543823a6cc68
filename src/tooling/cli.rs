//! CLI Tooling
//!
//! Command-line interface for the quick-look driver: the long-running watch
//! loop plus offline commands for classifying header files and inspecting
//! calibration choices.

use crate::calibration::{CalibrationCandidate, CalibrationSelector, CalibrationSet};
use crate::config::{ConfigLoader, QuickLookConfig};
use crate::driver::{index_directory, JobReport, QuickLookDriver};
use crate::error::{ApiError, StoreError};
use crate::logging::LoggingConfig;
use crate::scheduler::JobOutcome;
use crate::sequence::{Sequence, SequenceDetector};
use crate::store::{HeaderReader, MemoryStore, MetadataStore, SidecarHeaderReader};
use crate::watch::{FrameFileFilter, FrameWatcher};
use clap::{Parser, Subcommand};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Quick-look orchestration for near-infrared imaging
#[derive(Parser)]
#[command(name = "quicklook")]
#[command(about = "Groups incoming frames into sequences and schedules their reduction")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (debug level)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Fold command line logging flags over the configured ones
    pub fn logging_config(&self, base: &LoggingConfig) -> LoggingConfig {
        let mut logging = base.clone();
        if self.verbose {
            logging.level = "debug".to_string();
        }
        if let Some(level) = &self.log_level {
            logging.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            logging.format = format.clone();
        }
        if let Some(output) = &self.log_output {
            logging.output = output.clone();
        }
        if let Some(file) = &self.log_file {
            logging.file = Some(file.clone());
        }
        logging
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Watch the input directory and reduce sequences as they close
    Watch {
        /// Override watch.input_dir
        #[arg(long)]
        input_dir: Option<PathBuf>,
        /// Override watch.output_dir
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Do not announce frames already present at startup
        #[arg(long)]
        no_scan: bool,
    },
    /// Group header files into sequences without reducing anything
    Classify {
        /// Frames or their header sidecars, in arrival order
        #[arg(required = true)]
        headers: Vec<PathBuf>,
        /// Report the trailing open sequence as well
        #[arg(long)]
        flush: bool,
    },
    /// Show the calibrations that would be used for a frame
    Calibrations {
        /// Frame (or header sidecar) fixing exposure, filter and layout
        #[arg(long)]
        sample: PathBuf,
    },
    /// Print the effective configuration as TOML
    Config,
}

/// CLI context holding the effective configuration
pub struct CliContext {
    config: QuickLookConfig,
    config_path: Option<PathBuf>,
}

impl CliContext {
    /// Create a new CLI context
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = match &config_path {
            Some(path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load()?,
        };
        Ok(Self {
            config,
            config_path,
        })
    }

    pub fn with_config(config: QuickLookConfig) -> Self {
        Self {
            config,
            config_path: None,
        }
    }

    pub fn config(&self) -> &QuickLookConfig {
        &self.config
    }

    /// Execute a CLI command
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Watch {
                input_dir,
                output_dir,
                no_scan,
            } => {
                let mut config = self.config.clone();
                if let Some(dir) = input_dir {
                    config.watch.input_dir = dir.clone();
                }
                if let Some(dir) = output_dir {
                    config.watch.output_dir = dir.clone();
                }
                if *no_scan {
                    config.watch.scan_existing = false;
                }
                let runtime = tokio::runtime::Runtime::new().map_err(|e| {
                    ApiError::ConfigError(format!("Failed to create async runtime: {}", e))
                })?;
                runtime.block_on(run_watch(config))
            }
            Commands::Classify { headers, flush } => self.handle_classify(headers, *flush),
            Commands::Calibrations { sample } => self.handle_calibrations(sample),
            Commands::Config => {
                let mut out = String::new();
                if let Some(path) = &self.config_path {
                    out.push_str(&format!("# loaded from {}\n", path.display()));
                }
                out.push_str(&ConfigLoader::to_toml(&self.config)?);
                Ok(out)
            }
        }
    }

    fn reader(&self) -> SidecarHeaderReader {
        SidecarHeaderReader::new(self.config.watch.header_suffix.clone())
    }

    fn handle_classify(&self, headers: &[PathBuf], flush: bool) -> Result<String, ApiError> {
        let reader = self.reader();
        let mut detector =
            SequenceDetector::new(self.config.detector.max_pointing_distance_arcsec);
        let mut sequences = Vec::new();
        for path in headers {
            let frame = reader.read(&reader.frame_path(path))?;
            let outcome = detector.on_frame_arrived(frame);
            if outcome.closed {
                sequences.push(outcome.sequence);
            }
        }
        let open = if flush {
            detector.flush().map(|mut sequence| {
                sequence.closed = false;
                sequence
            })
        } else {
            None
        };
        if let Some(sequence) = open {
            sequences.push(sequence);
        }
        Ok(format_sequences(&sequences, detector.current_frames().len()))
    }

    fn handle_calibrations(&self, sample: &Path) -> Result<String, ApiError> {
        let reader: Arc<dyn HeaderReader> = Arc::new(self.reader());
        let filter = FrameFileFilter::new(
            &self.config.watch.extensions,
            self.config.watch.header_suffix.clone(),
        );
        let inputs = Arc::new(MemoryStore::new("inputs", Arc::clone(&reader)));
        let outputs = Arc::new(MemoryStore::new("outputs", Arc::clone(&reader)));
        index_directory(inputs.as_ref(), &self.config.watch.input_dir, &filter)?;
        index_directory(outputs.as_ref(), &self.config.watch.output_dir, &filter)?;

        let sample_frame = reader.read(sample)?;
        let selector = CalibrationSelector::new(
            inputs as Arc<dyn MetadataStore>,
            outputs as Arc<dyn MetadataStore>,
            self.config.calibration.bpm_path.clone(),
        );
        let set = selector.select_calibrations(&sample_frame)?;
        Ok(format_calibrations(&sample_frame.display_name(), &set))
    }
}

async fn run_watch(config: QuickLookConfig) -> Result<String, ApiError> {
    std::fs::create_dir_all(&config.watch.output_dir).map_err(|e| {
        ApiError::WatchError(format!(
            "Failed to create output directory {}: {}",
            config.watch.output_dir.display(),
            e
        ))
    })?;

    let mut driver = QuickLookDriver::from_config(&config)?;
    let filter = FrameFileFilter::new(&config.watch.extensions, config.watch.header_suffix.clone());
    let indexed = driver.index_outputs(&filter)?;
    info!(count = indexed, "Indexed existing reduction products");

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let _watcher = FrameWatcher::start(&config.watch, tx)?;

    let mut interval = tokio::time::interval(config.scheduler.tick_period());
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupt received, shutting down");
                break;
            }
            notification = rx.recv() => {
                let Some(notification) = notification else {
                    warn!("Watcher channel closed");
                    break;
                };
                match driver.handle_notification(notification) {
                    Ok(_) => {}
                    // sidecar still being written; its next write announces it again
                    Err(ApiError::StorageError(e @ StoreError::IncompleteHeader { .. })) => {
                        debug!(error = %e, "Header not complete yet");
                    }
                    Err(e) => warn!(error = %e, "Failed to handle notification"),
                }
            }
            _ = interval.tick() => {
                if let Some(report) = driver.tick() {
                    println!("{}", format_report(&report));
                }
            }
        }
    }

    let report = driver.shutdown();
    Ok(format!(
        "Watch stopped: {} queued job(s) discarded, interrupted: {}",
        report.discarded.len(),
        report
            .interrupted
            .map(|id| format!("job {}", id))
            .unwrap_or_else(|| "none".to_string())
    ))
}

/// One line per finished reduction
pub fn format_report(report: &JobReport) -> String {
    let completion = &report.completion;
    let status = match &completion.outcome {
        JobOutcome::Done(_) => format!("{}", "done".green()),
        JobOutcome::Failed(e) => format!("{}: {}", "failed".red(), e),
        JobOutcome::Cancelled => format!("{}", "cancelled".yellow()),
    };
    let elapsed = completion.finished_at - completion.submitted_at;
    let mut line = format!(
        "job {} [{}] {} in {}.{:03}s",
        completion.job_id,
        completion.label,
        status,
        elapsed.num_seconds(),
        elapsed.num_milliseconds().rem_euclid(1000)
    );
    for file in &report.indexed {
        line.push_str(&format!("\n  -> {}", file.display()));
    }
    line
}

fn format_sequences(sequences: &[Sequence], still_open: usize) -> String {
    if sequences.is_empty() {
        return format!("No closed sequences ({} frame(s) still open)", still_open);
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["#", "Kind", "Frames", "First", "Last", "State"]);
    for (i, sequence) in sequences.iter().enumerate() {
        let first = sequence
            .frames
            .first()
            .map(|f| f.display_name())
            .unwrap_or_default();
        let last = sequence
            .frames
            .last()
            .map(|f| f.display_name())
            .unwrap_or_default();
        let state = if sequence.closed { "closed" } else { "open" };
        table.add_row(vec![
            (i + 1).to_string(),
            sequence.kind.to_string(),
            sequence.len().to_string(),
            first,
            last,
            state.to_string(),
        ]);
    }
    table.to_string()
}

fn format_calibrations(sample: &str, set: &CalibrationSet) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Role", "File", "Match"]);
    let rows: [(&str, &Option<CalibrationCandidate>); 3] =
        [("dark", &set.dark), ("flat", &set.flat), ("bpm", &set.bpm)];
    for (role, candidate) in rows {
        match candidate {
            Some(c) => table.add_row(vec![
                role.to_string(),
                c.filename.display().to_string(),
                format!("{:?}", c.verdict),
            ]),
            None => table.add_row(vec![role.to_string(), "-".to_string(), "none".to_string()]),
        };
    }
    format!("{}\n{}", format!("Calibrations for {}", sample).bold(), table)
}
