//! Heuristic classification for frames without pattern metadata.

use super::{DetectionOutcome, LastObserved, SequenceDetector};
use crate::frame::Frame;
use crate::store::pointing_distance_arcsec;
use tracing::debug;

/// Why a heuristic sequence ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    MetadataChanged,
    PointingJump,
}

impl SequenceDetector {
    pub(super) fn classify_heuristic(&mut self, frame: Frame) -> DetectionOutcome {
        let observed = LastObserved::of(&frame);

        let boundary = match &self.last {
            None => None,
            Some(last) => {
                if last.ob_id != frame.ob_id
                    || last.filter != frame.filter
                    || last.frame_type != frame.frame_type
                {
                    Some(Boundary::MetadataChanged)
                } else if pointing_distance_arcsec(last.ra, last.dec, frame.ra, frame.dec)
                    > self.max_pointing_distance_arcsec
                {
                    Some(Boundary::PointingJump)
                } else {
                    None
                }
            }
        };

        let outcome = match boundary {
            Some(reason) if !self.current.is_empty() => {
                debug!(
                    reason = ?reason,
                    filename = %frame.filename.display(),
                    "Heuristic sequence boundary"
                );
                let closed = self.take_closed();
                self.restart_with(frame);
                DetectionOutcome {
                    closed: true,
                    sequence: closed,
                }
            }
            Some(_) => {
                self.restart_with(frame);
                DetectionOutcome {
                    closed: false,
                    sequence: self.open_snapshot(),
                }
            }
            None => {
                if self.last.is_none() {
                    self.restart_with(frame);
                } else {
                    self.push(frame);
                }
                DetectionOutcome {
                    closed: false,
                    sequence: self.open_snapshot(),
                }
            }
        };

        self.last = Some(observed);
        outcome
    }
}
