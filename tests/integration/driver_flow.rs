use quicklook::config::QuickLookConfig;
use quicklook::driver::{JobReport, QuickLookDriver};
use quicklook::error::{ApiError, JobError, StoreError};
use quicklook::frame::FrameType;
use quicklook::pipeline::{ReductionPipeline, ReductionRequest};
use quicklook::scheduler::{JobContext, JobOutput, JobState};
use quicklook::sequence::SequenceKind;
use quicklook::store::{MetadataStore, SidecarHeaderReader};
use quicklook::watch::{FileNotification, FrameFileFilter};
use notify::event::{AccessKind, AccessMode, CreateKind, DataChange, ModifyKind};
use notify::{Event, EventKind};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

use crate::integration::support::write_frame;

/// Writes a master dome flat with its header for every request
struct FlatMaker {
    requests: Mutex<Vec<ReductionRequest>>,
}

impl ReductionPipeline for FlatMaker {
    fn reduce(&self, request: &ReductionRequest, ctx: &JobContext) -> Result<JobOutput, JobError> {
        self.requests.lock().unwrap().push(request.clone());
        if request.kind != SequenceKind::DomeFlat {
            return Ok(JobOutput::Nothing);
        }
        let name = format!("master_flat_{}.fits", ctx.job_id());
        let path = write_frame(
            &request.output_dir,
            &name,
            json!({
                "type": "MASTER_DOME_FLAT",
                "filter": "J",
                "mjd": 60000.9,
                "shape": { "width": 64, "height": 64 }
            }),
        );
        Ok(JobOutput::File(path))
    }
}

fn config(dir: &Path) -> QuickLookConfig {
    let mut config = QuickLookConfig::default();
    config.watch.input_dir = dir.join("in");
    config.watch.output_dir = dir.join("out");
    fs::create_dir_all(&config.watch.input_dir).unwrap();
    fs::create_dir_all(&config.watch.output_dir).unwrap();
    config
}

fn planned_header(frame_type: &str, exp_no: i32, n_exp: i32, mjd: f64) -> serde_json::Value {
    json!({
        "type": frame_type,
        "filter": "J",
        "exptime": 10.0,
        "mjd": mjd,
        "from_planning_tool": true,
        "exp_no": exp_no,
        "n_exp": n_exp,
        "shape": { "width": 64, "height": 64 }
    })
}

fn wait_for_report(driver: &mut QuickLookDriver) -> JobReport {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(report) = driver.tick() {
            return report;
        }
        assert!(Instant::now() < deadline, "no report within deadline");
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn arrive(driver: &mut QuickLookDriver, path: PathBuf) {
    driver
        .handle_notification(FileNotification::Arrived(path))
        .unwrap();
}

#[test]
fn master_flat_feeds_the_following_science_sequence() {
    let temp = TempDir::new().unwrap();
    let config = config(temp.path());
    let input = config.watch.input_dir.clone();
    let pipeline = Arc::new(FlatMaker {
        requests: Mutex::new(Vec::new()),
    });
    let mut driver = QuickLookDriver::new(
        &config,
        Arc::new(SidecarHeaderReader::default()),
        Some(Arc::clone(&pipeline) as Arc<dyn ReductionPipeline>),
    );

    for exp_no in 1..=2 {
        let path = write_frame(
            &input,
            &format!("flat{}.fits", exp_no),
            planned_header("DOME_FLAT", exp_no, 2, 60000.0 + exp_no as f64 / 100.0),
        );
        arrive(&mut driver, path);
    }
    let flat_report = wait_for_report(&mut driver);
    assert_eq!(flat_report.completion.state(), JobState::Done);
    assert_eq!(flat_report.indexed.len(), 1);
    assert_eq!(driver.outputs().len(), 1);

    for exp_no in 1..=3 {
        let path = write_frame(
            &input,
            &format!("sci{}.fits", exp_no),
            planned_header("SCIENCE", exp_no, 3, 60001.0 + exp_no as f64 / 100.0),
        );
        arrive(&mut driver, path);
    }
    let science_report = wait_for_report(&mut driver);
    assert_eq!(science_report.completion.state(), JobState::Done);

    let requests = pipeline.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    let science = &requests[1];
    assert_eq!(science.kind, SequenceKind::Science);
    assert_eq!(science.frames.len(), 3);
    let flat = science.calibrations.flat.as_ref().unwrap();
    assert_eq!(flat.filename, flat_report.indexed[0]);
    assert!(science.calibrations.dark.is_none());
}

#[test]
fn removed_frames_leave_the_input_store() {
    let temp = TempDir::new().unwrap();
    let config = config(temp.path());
    let mut driver = QuickLookDriver::new(&config, Arc::new(SidecarHeaderReader::default()), None);
    let path = write_frame(
        &config.watch.input_dir,
        "dark1.fits",
        planned_header("DARK", 1, 5, 60000.0),
    );
    arrive(&mut driver, path.clone());
    let frame = driver.inputs().file_info(&path).unwrap().unwrap();
    assert_eq!(frame.frame_type, FrameType::Dark);

    driver
        .handle_notification(FileNotification::Removed(path.clone()))
        .unwrap();
    assert!(driver.inputs().file_info(&path).unwrap().is_none());
}

#[test]
fn failing_reduction_is_reported_and_loop_continues() {
    struct Failing;
    impl ReductionPipeline for Failing {
        fn reduce(&self, _: &ReductionRequest, _: &JobContext) -> Result<JobOutput, JobError> {
            Err(JobError::ReductionFailed("bad pixels".to_string()))
        }
    }

    let temp = TempDir::new().unwrap();
    let config = config(temp.path());
    let mut driver = QuickLookDriver::new(
        &config,
        Arc::new(SidecarHeaderReader::default()),
        Some(Arc::new(Failing) as Arc<dyn ReductionPipeline>),
    );
    let path = write_frame(
        &config.watch.input_dir,
        "sci1.fits",
        planned_header("SCIENCE", 1, 1, 60000.0),
    );
    arrive(&mut driver, path);
    let report = wait_for_report(&mut driver);
    assert_eq!(
        report.error(),
        Some(&JobError::ReductionFailed("bad pixels".to_string()))
    );
    assert!(report.indexed.is_empty());
    assert!(driver.scheduler().is_idle());
}

#[cfg(unix)]
#[test]
fn command_pipeline_products_are_indexed() {
    let temp = TempDir::new().unwrap();
    let mut config = config(temp.path());
    config.pipeline.command = Some("sh".to_string());
    config.pipeline.args = vec![
        "-c".to_string(),
        concat!(
            "echo '{\"type\": \"MASTER_DARK\", \"mjd\": 60000.5, \"exptime\": 10.0, ",
            "\"shape\": {\"width\": 64, \"height\": 64}}' > master_dark.fits.json; ",
            "touch master_dark.fits; echo master_dark.fits"
        )
        .to_string(),
    ];
    let mut driver = QuickLookDriver::from_config(&config).unwrap();
    for exp_no in 1..=2 {
        let path = write_frame(
            &config.watch.input_dir,
            &format!("dark{}.fits", exp_no),
            planned_header("DARK", exp_no, 2, 60000.0 + exp_no as f64 / 100.0),
        );
        arrive(&mut driver, path);
    }
    let report = wait_for_report(&mut driver);
    assert_eq!(report.completion.state(), JobState::Done);
    let master = config.watch.output_dir.join("master_dark.fits");
    assert_eq!(report.indexed, vec![master.clone()]);
    let indexed = driver.outputs().file_info(&master).unwrap().unwrap();
    assert_eq!(indexed.frame_type, FrameType::MasterDark);
}

#[test]
fn sidecar_created_empty_registers_once_written() {
    let temp = TempDir::new().unwrap();
    let config = config(temp.path());
    let filter = FrameFileFilter::new(&config.watch.extensions, config.watch.header_suffix.clone());
    let mut driver = QuickLookDriver::new(&config, Arc::new(SidecarHeaderReader::default()), None);

    let frame = config.watch.input_dir.join("a.fits");
    let sidecar = config.watch.input_dir.join("a.fits.json");
    fs::write(&frame, b"").unwrap();
    fs::write(&sidecar, b"").unwrap();

    let created = Event::new(EventKind::Create(CreateKind::File)).add_path(sidecar.clone());
    let notifications = filter.convert_event(&created);
    assert_eq!(notifications, vec![FileNotification::Arrived(frame.clone())]);
    for notification in notifications {
        assert!(matches!(
            driver.handle_notification(notification),
            Err(ApiError::StorageError(StoreError::IncompleteHeader { .. }))
        ));
    }
    assert!(driver.inputs().is_empty());

    fs::write(
        &sidecar,
        serde_json::to_vec(&planned_header("SCIENCE", 1, 3, 60000.0)).unwrap(),
    )
    .unwrap();
    let written = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
        .add_path(sidecar.clone());
    for notification in filter.convert_event(&written) {
        driver.handle_notification(notification).unwrap();
    }
    assert_eq!(driver.inputs().len(), 1);
    assert_eq!(driver.detector().current_frames().len(), 1);

    // the close after writing repeats the announcement harmlessly
    let closed = Event::new(EventKind::Access(AccessKind::Close(AccessMode::Write)))
        .add_path(sidecar);
    for notification in filter.convert_event(&closed) {
        assert!(driver.handle_notification(notification).unwrap().is_none());
    }
    assert_eq!(driver.detector().current_frames().len(), 1);
}
