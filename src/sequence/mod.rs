//! Sequence Detection
//!
//! Groups the stream of arriving frames into observation sequences. Frames
//! written by the observation planning tool carry their position inside an
//! exposure pattern and are closed by pattern position; all other frames are
//! grouped heuristically by observing block, filter, type and pointing.
//!
//! One detector instance owns the state of one data source. It is driven from
//! a single thread and needs no locking.

mod heuristic;
mod planned;

use crate::frame::{Frame, FrameType};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::info;

/// Default maximum pointing offset inside one heuristic sequence (arcsec)
pub const DEFAULT_MAX_POINTING_DISTANCE_ARCSEC: f64 = 1000.0;

/// Classification of a whole sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SequenceKind {
    Dark,
    DomeFlat,
    SkyFlat,
    Focus,
    Science,
    Unknown,
}

impl SequenceKind {
    /// Kind of a sequence whose first frame has the given type
    pub fn from_frame_type(frame_type: FrameType) -> Self {
        match frame_type {
            FrameType::Dark => SequenceKind::Dark,
            t if t.is_dome_flat() => SequenceKind::DomeFlat,
            FrameType::SkyFlat => SequenceKind::SkyFlat,
            FrameType::Focus => SequenceKind::Focus,
            FrameType::Science | FrameType::Sky => SequenceKind::Science,
            _ => SequenceKind::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SequenceKind::Dark => "DARK",
            SequenceKind::DomeFlat => "DOME_FLAT",
            SequenceKind::SkyFlat => "SKY_FLAT",
            SequenceKind::Focus => "FOCUS",
            SequenceKind::Science => "SCIENCE",
            SequenceKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for SequenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered run of frames belonging to one observing episode
#[derive(Debug, Clone, Serialize)]
pub struct Sequence {
    pub frames: Vec<Frame>,
    pub kind: SequenceKind,
    pub open_since: DateTime<Utc>,
    pub closed: bool,
}

impl Sequence {
    fn snapshot(frames: &[Frame], open_since: DateTime<Utc>, closed: bool) -> Self {
        let kind = frames
            .first()
            .map(|f| SequenceKind::from_frame_type(f.frame_type))
            .unwrap_or(SequenceKind::Unknown);
        Self {
            frames: frames.to_vec(),
            kind,
            open_since,
            closed,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Representative frame for calibration lookup: the first science frame,
    /// otherwise the first frame
    pub fn sample_frame(&self) -> Option<&Frame> {
        self.frames
            .iter()
            .find(|f| f.frame_type == FrameType::Science)
            .or_else(|| self.frames.first())
    }
}

/// Result of feeding one frame to the detector
///
/// When `closed` is false, `sequence` is a snapshot of the open buffer so that
/// callers can display in-progress sequences.
#[derive(Debug, Clone)]
pub struct DetectionOutcome {
    pub closed: bool,
    pub sequence: Sequence,
}

impl DetectionOutcome {
    pub fn sequence_type(&self) -> SequenceKind {
        self.sequence.kind
    }
}

/// Attributes of the most recently observed frame
#[derive(Debug, Clone)]
struct LastObserved {
    ra: f64,
    dec: f64,
    filter: String,
    ob_id: i64,
    frame_type: FrameType,
}

impl LastObserved {
    fn of(frame: &Frame) -> Self {
        Self {
            ra: frame.ra,
            dec: frame.dec,
            filter: frame.filter.clone(),
            ob_id: frame.ob_id,
            frame_type: frame.frame_type,
        }
    }
}

/// Sequence detector for one data source
pub struct SequenceDetector {
    max_pointing_distance_arcsec: f64,
    current: Vec<Frame>,
    open_since: DateTime<Utc>,
    /// None until the first frame arrives
    last: Option<LastObserved>,
}

impl SequenceDetector {
    pub fn new(max_pointing_distance_arcsec: f64) -> Self {
        Self {
            max_pointing_distance_arcsec,
            current: Vec::new(),
            open_since: Utc::now(),
            last: None,
        }
    }

    /// Classify one arriving frame
    pub fn on_frame_arrived(&mut self, frame: Frame) -> DetectionOutcome {
        let outcome = if frame.from_planning_tool {
            self.classify_planned(frame)
        } else {
            self.classify_heuristic(frame)
        };

        if outcome.closed {
            info!(
                kind = %outcome.sequence.kind,
                frames = outcome.sequence.len(),
                "Sequence closed"
            );
        }
        outcome
    }

    /// Close and hand off whatever is open
    pub fn flush(&mut self) -> Option<Sequence> {
        if self.current.is_empty() {
            return None;
        }
        let frames = std::mem::take(&mut self.current);
        let sequence = Sequence::snapshot(&frames, self.open_since, true);
        info!(
            kind = %sequence.kind,
            frames = sequence.len(),
            "Flushed open sequence"
        );
        Some(sequence)
    }

    /// Forget the open buffer and the last observed attributes
    pub fn reset(&mut self) {
        self.current.clear();
        self.last = None;
    }

    /// Frames of the open buffer, in arrival order
    pub fn current_frames(&self) -> &[Frame] {
        &self.current
    }

    pub fn max_pointing_distance_arcsec(&self) -> f64 {
        self.max_pointing_distance_arcsec
    }

    /// Start a fresh buffer holding only `frame`
    fn restart_with(&mut self, frame: Frame) {
        self.current.clear();
        self.push(frame);
    }

    fn push(&mut self, frame: Frame) {
        if self.current.is_empty() {
            self.open_since = Utc::now();
        }
        self.current.push(frame);
    }

    /// Freeze the open buffer into a closed sequence and empty it
    fn take_closed(&mut self) -> Sequence {
        let frames = std::mem::take(&mut self.current);
        Sequence::snapshot(&frames, self.open_since, true)
    }

    fn open_snapshot(&self) -> Sequence {
        Sequence::snapshot(&self.current, self.open_since, false)
    }

    fn remember(&mut self, frame: &Frame) {
        self.last = Some(LastObserved::of(frame));
    }
}

impl Default for SequenceDetector {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POINTING_DISTANCE_ARCSEC)
    }
}
