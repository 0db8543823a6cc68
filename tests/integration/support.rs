use quicklook::error::StoreError;
use quicklook::frame::{Frame, FrameType, Shape};
use quicklook::store::{HeaderReader, MemoryStore};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Reader for stores populated through `insert_frame` only
pub struct NoHeaders;

impl HeaderReader for NoHeaders {
    fn read(&self, path: &Path) -> Result<Frame, StoreError> {
        Err(StoreError::HeaderUnreadable {
            path: path.to_path_buf(),
            message: "no headers in this fixture".to_string(),
        })
    }
}

pub fn store(label: &str, frames: Vec<Frame>) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new(label, Arc::new(NoHeaders)));
    for frame in frames {
        store.insert_frame(frame);
    }
    store
}

pub fn planned(name: &str, frame_type: FrameType, exp_no: i32, n_exp: i32) -> Frame {
    Frame::new(format!("/in/{}.fits", name), frame_type, 60000.0 + exp_no as f64)
        .with_filter("J")
        .with_pattern(exp_no, n_exp)
}

pub fn heuristic(name: &str, frame_type: FrameType, ob_id: i64, ra: f64, dec: f64) -> Frame {
    Frame::new(format!("/in/{}.fits", name), frame_type, 60000.0)
        .with_filter("H")
        .with_ob_id(ob_id)
        .with_pointing(ra, dec)
}

pub fn master(name: &str, frame_type: FrameType, mjd: f64, shape: Shape) -> Frame {
    Frame::new(format!("/out/{}.fits", name), frame_type, mjd)
        .with_filter("J")
        .with_exposure(10.0, 1)
        .with_shape(shape)
}

/// Write an empty frame file and its JSON header sidecar
pub fn write_frame(dir: &Path, name: &str, header: serde_json::Value) -> PathBuf {
    let frame = dir.join(name);
    fs::write(&frame, b"").unwrap();
    fs::write(
        dir.join(format!("{}.json", name)),
        serde_json::to_vec(&header).unwrap(),
    )
    .unwrap();
    frame
}
