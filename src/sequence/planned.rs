//! Pattern-driven classification for planning-tool frames.

use super::{DetectionOutcome, LastObserved, SequenceDetector};
use crate::frame::{Frame, FrameType};
use crate::types::UNKNOWN_EXP_NO;
use tracing::error;

impl SequenceDetector {
    pub(super) fn classify_planned(&mut self, frame: Frame) -> DetectionOutcome {
        let observed = LastObserved::of(&frame);
        let (exp_no, n_exp, frame_type) = (frame.exp_no, frame.n_exp, frame.frame_type);
        let starts_pattern = exp_no == 1;

        if starts_pattern {
            // single-exposure patterns close on this same call and compare against it
            self.last = Some(observed.clone());
            self.restart_with(frame);
        } else {
            self.push(frame);
        }

        let last_type = self.last.as_ref().map(|last| last.frame_type);

        if closes_pattern(exp_no, n_exp, frame_type, last_type) {
            self.last = Some(observed);
            return DetectionOutcome {
                closed: true,
                sequence: self.take_closed(),
            };
        }

        if !starts_pattern {
            if let Some(previous) = last_type {
                if !types_compatible(previous, frame_type) {
                    self.evict_previous(previous, frame_type);
                }
            }
        }

        self.last = Some(observed);
        DetectionOutcome {
            closed: false,
            sequence: self.open_snapshot(),
        }
    }

    /// Drop the frame preceding the newest one from the open buffer
    fn evict_previous(&mut self, previous: FrameType, current: FrameType) {
        let len = self.current.len();
        if len < 2 {
            return;
        }
        let evicted = self.current.remove(len - 2);
        error!(
            filename = %evicted.filename.display(),
            previous = %previous,
            current = %current,
            "Frame type changed inside a pattern, evicted previous frame from sequence"
        );
    }
}

/// Last exposure of a known pattern, of the same type as the one before it
fn closes_pattern(
    exp_no: i32,
    n_exp: i32,
    frame_type: FrameType,
    last_type: Option<FrameType>,
) -> bool {
    if exp_no == UNKNOWN_EXP_NO || exp_no != n_exp {
        return false;
    }
    match last_type {
        None => true,
        Some(last) => last == frame_type || last.is_sky() || frame_type.is_sky(),
    }
}

/// Frame types that may share one open pattern
fn types_compatible(previous: FrameType, current: FrameType) -> bool {
    previous == current
        || (previous.is_dome_flat() && current.is_dome_flat())
        || previous.is_sky()
        || current.is_sky()
}
