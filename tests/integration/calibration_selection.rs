use quicklook::calibration::{CalibrationSelector, ShapeVerdict};
use quicklook::frame::{Frame, FrameType, Shape};
use quicklook::store::MetadataStore;
use std::path::PathBuf;
use std::sync::Arc;

use crate::integration::support::{master, store};

fn science(shape: Shape) -> Frame {
    Frame::new("/in/sci.fits", FrameType::Science, 60100.0)
        .with_filter("J")
        .with_exposure(10.0, 1)
        .with_shape(shape)
}

fn selector(local: Vec<Frame>, external: Vec<Frame>) -> CalibrationSelector {
    CalibrationSelector::new(
        store("inputs", local) as Arc<dyn MetadataStore>,
        store("outputs", external) as Arc<dyn MetadataStore>,
        Some(PathBuf::from("/cal/bpm.fits")),
    )
}

#[test]
fn selection_is_idempotent() {
    let mef = Shape::new(4, 2048, 2048);
    let selector = selector(
        vec![master("local_dome", FrameType::MasterDomeFlat, 5.0, mef)],
        vec![
            master("dark_a", FrameType::MasterDark, 1.0, mef),
            master("dark_b", FrameType::MasterDark, 2.0, mef),
        ],
    );
    let sample = science(mef);
    let first = selector.select_calibrations(&sample).unwrap();
    let second = selector.select_calibrations(&sample).unwrap();
    let names = |set: &quicklook::calibration::CalibrationSet| {
        set.iter()
            .map(|c| c.filename.clone())
            .collect::<Vec<PathBuf>>()
    };
    assert_eq!(names(&first), names(&second));
    assert_eq!(
        first.dark.unwrap().filename,
        PathBuf::from("/out/dark_b.fits")
    );
}

#[test]
fn local_flats_win_over_external_flats() {
    let shape = Shape::new(0, 1024, 1024);
    let selector = selector(
        vec![master("local_tw", FrameType::MasterTwFlat, 1.0, shape)],
        vec![master("external_dome", FrameType::MasterDomeFlat, 9.0, shape)],
    );
    let set = selector.select_calibrations(&science(shape)).unwrap();
    assert_eq!(
        set.flat.unwrap().filename,
        PathBuf::from("/out/local_tw.fits")
    );
}

#[test]
fn dark_models_win_over_exposure_matched_darks() {
    let shape = Shape::new(0, 1024, 1024);
    let model = master("model", FrameType::MasterDarkModel, 1.0, Shape::cube(0, 1024, 1024, 2));
    let selector = selector(
        Vec::new(),
        vec![model, master("exact", FrameType::MasterDark, 9.0, shape)],
    );
    let dark = selector
        .select_calibrations(&science(shape))
        .unwrap()
        .dark
        .unwrap();
    assert_eq!(dark.filename, PathBuf::from("/out/model.fits"));
    assert_eq!(dark.verdict, ShapeVerdict::DarkModel);
}

#[test]
fn mef_sample_rejects_smaller_candidates() {
    let sample = science(Shape::new(4, 2048, 2048));
    let selector = selector(
        Vec::new(),
        vec![
            master("big", FrameType::MasterDark, 1.0, Shape::new(4, 2048, 2048)),
            master("small", FrameType::MasterDark, 2.0, Shape::new(4, 1024, 1024)),
        ],
    );
    let dark = selector.select_calibrations(&sample).unwrap().dark.unwrap();
    assert_eq!(dark.filename, PathBuf::from("/out/big.fits"));
    assert_eq!(dark.verdict, ShapeVerdict::Exact);
}

#[test]
fn shape_filter_does_not_fall_back_to_later_stores() {
    let sample = science(Shape::new(4, 2048, 2048));
    // the local dome flat hits first but has the wrong layout
    let selector = selector(
        vec![master("local_dome", FrameType::MasterDomeFlat, 1.0, Shape::new(0, 512, 512))],
        vec![master("external_dome", FrameType::MasterDomeFlat, 2.0, Shape::new(4, 2048, 2048))],
    );
    let set = selector.select_calibrations(&sample).unwrap();
    assert!(set.flat.is_none());
    assert_eq!(set.bpm.unwrap().verdict, ShapeVerdict::Unchecked);
}

#[test]
fn nothing_found_yields_empty_roles() {
    let selector = CalibrationSelector::new(
        store("inputs", Vec::new()) as Arc<dyn MetadataStore>,
        store("outputs", Vec::new()) as Arc<dyn MetadataStore>,
        None,
    );
    let set = selector
        .select_calibrations(&science(Shape::new(0, 64, 64)))
        .unwrap();
    assert!(set.is_empty());
}
