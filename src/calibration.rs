//! Calibration Selection
//!
//! Finds the most recent master calibrations compatible with a science frame.
//! The local (inputs) store is searched before the external (outputs) store,
//! and every search is followed by a strict pixel-layout filter.

use crate::error::StoreError;
use crate::frame::{Frame, FrameType};
use crate::store::{FrameQuery, MetadataStore};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Role a calibration artifact plays in a reduction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationRole {
    Dark,
    Flat,
    Bpm,
}

impl fmt::Display for CalibrationRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CalibrationRole::Dark => "dark",
            CalibrationRole::Flat => "flat",
            CalibrationRole::Bpm => "bpm",
        };
        f.write_str(name)
    }
}

/// How a candidate satisfied the layout check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeVerdict {
    /// Same extension count and per-extension dimensions
    Exact,
    /// Candidate dimensions equal the planes of a cube sample
    CubePlanes,
    /// Dark models are two-layer products exempt from the check
    DarkModel,
    /// Static artifact, never compared
    Unchecked,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalibrationCandidate {
    pub role: CalibrationRole,
    pub filename: PathBuf,
    /// None for static artifacts that are not indexed in a store
    pub frame: Option<Frame>,
    pub verdict: ShapeVerdict,
}

/// Best calibration of each role; None where nothing suitable exists
#[derive(Debug, Clone, Default, Serialize)]
pub struct CalibrationSet {
    pub dark: Option<CalibrationCandidate>,
    pub flat: Option<CalibrationCandidate>,
    pub bpm: Option<CalibrationCandidate>,
}

impl CalibrationSet {
    pub fn is_empty(&self) -> bool {
        self.dark.is_none() && self.flat.is_none() && self.bpm.is_none()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CalibrationCandidate> {
        [&self.dark, &self.flat, &self.bpm]
            .into_iter()
            .filter_map(Option::as_ref)
    }
}

pub struct CalibrationSelector {
    local: Arc<dyn MetadataStore>,
    external: Arc<dyn MetadataStore>,
    bpm_path: Option<PathBuf>,
}

impl CalibrationSelector {
    pub fn new(
        local: Arc<dyn MetadataStore>,
        external: Arc<dyn MetadataStore>,
        bpm_path: Option<PathBuf>,
    ) -> Self {
        Self {
            local,
            external,
            bpm_path,
        }
    }

    /// Select dark, flat and BPM for the frame fixing exposure, filter and layout
    pub fn select_calibrations(&self, sample: &Frame) -> Result<CalibrationSet, StoreError> {
        let dark = best_shaped_frame(&self.search_darks(sample)?, sample)
            .map(|(frame, verdict)| candidate(CalibrationRole::Dark, frame, verdict));
        let flat = best_shaped_frame(&self.search_flats(sample)?, sample)
            .map(|(frame, verdict)| candidate(CalibrationRole::Flat, frame, verdict));
        let bpm = self.bpm_path.as_ref().map(|path| CalibrationCandidate {
            role: CalibrationRole::Bpm,
            filename: path.clone(),
            frame: None,
            verdict: ShapeVerdict::Unchecked,
        });

        info!(
            sample = %sample.display_name(),
            dark = ?dark.as_ref().map(|c| c.filename.display().to_string()),
            flat = ?flat.as_ref().map(|c| c.filename.display().to_string()),
            bpm = ?bpm.as_ref().map(|c| c.filename.display().to_string()),
            "Selected calibrations"
        );

        Ok(CalibrationSet { dark, flat, bpm })
    }

    /// Select calibrations for a frame list, sampling its first science frame
    pub fn select_for_frames(&self, frames: &[Frame]) -> Result<CalibrationSet, StoreError> {
        let sample = frames
            .iter()
            .find(|f| f.frame_type == FrameType::Science)
            .or_else(|| frames.first());
        match sample {
            Some(sample) => self.select_calibrations(sample),
            None => Ok(CalibrationSet::default()),
        }
    }

    fn search_darks(&self, sample: &Frame) -> Result<Vec<Frame>, StoreError> {
        let model = FrameQuery::of_type(FrameType::MasterDarkModel);
        let exact = FrameQuery::of_type(FrameType::MasterDark)
            .exposure_time(sample.exposure_time)
            .coadds(sample.coadds);
        first_non_empty(
            "dark",
            &[
                (self.local.as_ref(), &model),
                (self.external.as_ref(), &model),
                (self.external.as_ref(), &exact),
            ],
        )
    }

    fn search_flats(&self, sample: &Frame) -> Result<Vec<Frame>, StoreError> {
        let dome = FrameQuery::of_type(FrameType::MasterDomeFlat).filter(sample.filter.clone());
        let twilight = FrameQuery::of_type(FrameType::MasterTwFlat).filter(sample.filter.clone());
        first_non_empty(
            "flat",
            &[
                (self.local.as_ref(), &dome),
                (self.local.as_ref(), &twilight),
                (self.external.as_ref(), &dome),
                (self.external.as_ref(), &twilight),
            ],
        )
    }
}

fn candidate(role: CalibrationRole, frame: Frame, verdict: ShapeVerdict) -> CalibrationCandidate {
    CalibrationCandidate {
        role,
        filename: frame.filename.clone(),
        frame: Some(frame),
        verdict,
    }
}

/// Run queries in order and keep the first non-empty result
fn first_non_empty(
    role: &str,
    searches: &[(&dyn MetadataStore, &FrameQuery)],
) -> Result<Vec<Frame>, StoreError> {
    for (index, (store, query)) in searches.iter().enumerate() {
        let found = store.files_of_type(query)?;
        if !found.is_empty() {
            debug!(
                role,
                step = index,
                frame_type = %query.frame_type,
                found = found.len(),
                "Calibration search hit"
            );
            return Ok(found);
        }
    }
    debug!(role, "No calibration candidates found");
    Ok(Vec::new())
}

/// Layout compatibility of one candidate with the sample
pub fn shape_verdict(candidate: &Frame, sample: &Frame) -> Option<ShapeVerdict> {
    let (c, s) = (&candidate.shape, &sample.shape);
    if c.extensions == s.extensions && c.plane_dims() == s.plane_dims() && c.planes == s.planes {
        Some(ShapeVerdict::Exact)
    } else if s.is_cube() && c.plane_dims() == s.plane_dims() {
        Some(ShapeVerdict::CubePlanes)
    } else if candidate.frame_type == FrameType::MasterDarkModel {
        Some(ShapeVerdict::DarkModel)
    } else {
        None
    }
}

/// Most recent candidate compatible with the sample layout
///
/// `candidates` must be ascending by observation date. Returns None when no
/// candidate matches; the most recent one is never returned regardless of shape.
pub fn best_shaped_frame(candidates: &[Frame], sample: &Frame) -> Option<(Frame, ShapeVerdict)> {
    candidates.iter().rev().find_map(|candidate| {
        shape_verdict(candidate, sample).map(|verdict| (candidate.clone(), verdict))
    })
}
