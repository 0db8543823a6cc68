//! Instrument Frames
//!
//! Immutable metadata records for registered instrument exposures. A frame is
//! keyed by its filename and ordered by its observation date.

use crate::types::{Mjd, UNKNOWN_EXP_NO, UNKNOWN_OB_ID};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Frame type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrameType {
    Dark,
    DomeFlat,
    DomeFlatLampOn,
    DomeFlatLampOff,
    SkyFlat,
    Sky,
    Focus,
    Science,
    MasterDark,
    MasterDarkModel,
    MasterDomeFlat,
    MasterTwFlat,
    MasterSkyFlat,
    MasterBpm,
    #[serde(other)]
    Unknown,
}

impl FrameType {
    /// Dome flats, including the lamp on/off variants taken in alternation
    pub fn is_dome_flat(self) -> bool {
        matches!(
            self,
            FrameType::DomeFlat | FrameType::DomeFlatLampOn | FrameType::DomeFlatLampOff
        )
    }

    /// Sky frames interleaved with science exposures in offset patterns
    pub fn is_sky(self) -> bool {
        matches!(self, FrameType::Sky)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FrameType::Dark => "DARK",
            FrameType::DomeFlat => "DOME_FLAT",
            FrameType::DomeFlatLampOn => "DOME_FLAT_LAMP_ON",
            FrameType::DomeFlatLampOff => "DOME_FLAT_LAMP_OFF",
            FrameType::SkyFlat => "SKY_FLAT",
            FrameType::Sky => "SKY",
            FrameType::Focus => "FOCUS",
            FrameType::Science => "SCIENCE",
            FrameType::MasterDark => "MASTER_DARK",
            FrameType::MasterDarkModel => "MASTER_DARK_MODEL",
            FrameType::MasterDomeFlat => "MASTER_DOME_FLAT",
            FrameType::MasterTwFlat => "MASTER_TW_FLAT",
            FrameType::MasterSkyFlat => "MASTER_SKY_FLAT",
            FrameType::MasterBpm => "MASTER_BPM",
            FrameType::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pixel layout of a frame
///
/// `extensions` is 0 for a single-HDU file and the number of image extensions
/// for a MEF. `planes` is greater than 1 for data cubes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    #[serde(default)]
    pub extensions: u32,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_planes")]
    pub planes: u32,
}

fn default_planes() -> u32 {
    1
}

impl Shape {
    pub fn new(extensions: u32, width: u32, height: u32) -> Self {
        Self {
            extensions,
            width,
            height,
            planes: 1,
        }
    }

    pub fn cube(extensions: u32, width: u32, height: u32, planes: u32) -> Self {
        Self {
            extensions,
            width,
            height,
            planes,
        }
    }

    pub fn is_cube(&self) -> bool {
        self.planes > 1
    }

    /// Dimensions of a single image plane of a single extension
    pub fn plane_dims(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_cube() {
            write!(
                f,
                "{}x[{}x{}x{}]",
                self.extensions, self.width, self.height, self.planes
            )
        } else {
            write!(f, "{}x[{}x{}]", self.extensions, self.width, self.height)
        }
    }
}

/// Registered instrument exposure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub filename: PathBuf,
    pub observed_at: Mjd,
    pub frame_type: FrameType,
    pub filter: String,
    pub exposure_time: f64,
    pub coadds: u32,
    pub ra: f64,
    pub dec: f64,
    pub ob_id: i64,
    pub exp_no: i32,
    pub n_exp: i32,
    pub from_planning_tool: bool,
    pub shape: Shape,
}

impl Frame {
    /// Create a frame with neutral metadata; callers fill in what they know
    pub fn new(filename: impl Into<PathBuf>, frame_type: FrameType, observed_at: Mjd) -> Self {
        Self {
            filename: filename.into(),
            observed_at,
            frame_type,
            filter: String::new(),
            exposure_time: 0.0,
            coadds: 1,
            ra: 0.0,
            dec: 0.0,
            ob_id: UNKNOWN_OB_ID,
            exp_no: UNKNOWN_EXP_NO,
            n_exp: UNKNOWN_EXP_NO,
            from_planning_tool: false,
            shape: Shape::new(0, 0, 0),
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_exposure(mut self, exposure_time: f64, coadds: u32) -> Self {
        self.exposure_time = exposure_time;
        self.coadds = coadds;
        self
    }

    pub fn with_pointing(mut self, ra: f64, dec: f64) -> Self {
        self.ra = ra;
        self.dec = dec;
        self
    }

    pub fn with_ob_id(mut self, ob_id: i64) -> Self {
        self.ob_id = ob_id;
        self
    }

    /// Mark the frame as produced by the planning tool at a pattern position
    pub fn with_pattern(mut self, exp_no: i32, n_exp: i32) -> Self {
        self.exp_no = exp_no;
        self.n_exp = n_exp;
        self.from_planning_tool = true;
        self
    }

    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.shape = shape;
        self
    }

    /// Display name used in logs
    pub fn display_name(&self) -> String {
        self.filename
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.filename.to_string_lossy().to_string())
    }
}
