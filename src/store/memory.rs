//! In-memory metadata store
//!
//! Process-lifetime index of frames keyed by filename. Interior locking lets
//! the driver loop mutate the store while readers hold shared references.

use super::{FrameQuery, HeaderReader, MetadataStore};
use crate::error::StoreError;
use crate::frame::Frame;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub struct MemoryStore {
    label: String,
    frames: RwLock<HashMap<PathBuf, Frame>>,
    reader: Arc<dyn HeaderReader>,
}

impl MemoryStore {
    pub fn new(label: impl Into<String>, reader: Arc<dyn HeaderReader>) -> Self {
        Self {
            label: label.into(),
            frames: RwLock::new(HashMap::new()),
            reader,
        }
    }

    /// Register an already decoded frame; returns false if the filename is taken
    pub fn insert_frame(&self, frame: Frame) -> bool {
        let mut frames = self.frames.write();
        if frames.contains_key(&frame.filename) {
            return false;
        }
        debug!(
            store = %self.label,
            filename = %frame.filename.display(),
            frame_type = %frame.frame_type,
            "Registered frame"
        );
        frames.insert(frame.filename.clone(), frame);
        true
    }
}

impl MetadataStore for MemoryStore {
    fn insert(&self, path: &Path) -> Result<bool, StoreError> {
        if self.frames.read().contains_key(path) {
            return Ok(false);
        }
        let frame = self.reader.read(path)?;
        Ok(self.insert_frame(frame))
    }

    fn delete(&self, path: &Path) -> Result<bool, StoreError> {
        let removed = self.frames.write().remove(path).is_some();
        if removed {
            debug!(store = %self.label, filename = %path.display(), "Removed frame");
        }
        Ok(removed)
    }

    fn files_of_type(&self, query: &FrameQuery) -> Result<Vec<Frame>, StoreError> {
        let frames = self.frames.read();
        let mut matching: Vec<Frame> = frames
            .values()
            .filter(|frame| query.matches(frame))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            a.observed_at
                .total_cmp(&b.observed_at)
                .then_with(|| a.filename.cmp(&b.filename))
        });
        Ok(matching)
    }

    fn file_info(&self, path: &Path) -> Result<Option<Frame>, StoreError> {
        Ok(self.frames.read().get(path).cloned())
    }

    fn len(&self) -> usize {
        self.frames.read().len()
    }

    fn clear(&self) {
        self.frames.write().clear();
    }
}
