//! Header sources
//!
//! Decoding FITS headers is delegated to a `HeaderReader`. The bundled reader
//! consumes JSON sidecar files written next to each frame by the acquisition
//! system.

use crate::error::StoreError;
use crate::frame::{Frame, FrameType, Shape};
use crate::types::{Mjd, UNKNOWN_EXP_NO, UNKNOWN_OB_ID};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// MJD of the Unix epoch
const MJD_UNIX_EPOCH: f64 = 40587.0;

/// Reads the metadata of a frame file
pub trait HeaderReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<Frame, StoreError>;
}

/// Header keywords the orchestration layer relies on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameHeader {
    #[serde(rename = "type")]
    pub frame_type: FrameType,
    #[serde(default)]
    pub filter: String,
    #[serde(default)]
    pub exptime: f64,
    #[serde(default = "default_coadds")]
    pub ncoadds: u32,
    #[serde(default)]
    pub ra: f64,
    #[serde(default)]
    pub dec: f64,
    #[serde(default)]
    pub mjd: Option<Mjd>,
    #[serde(default)]
    pub date_obs: Option<String>,
    #[serde(default = "default_ob_id")]
    pub ob_id: i64,
    #[serde(default = "default_exp_no")]
    pub exp_no: i32,
    #[serde(default = "default_exp_no")]
    pub n_exp: i32,
    #[serde(default)]
    pub from_planning_tool: bool,
    pub shape: Shape,
}

fn default_coadds() -> u32 {
    1
}

fn default_ob_id() -> i64 {
    UNKNOWN_OB_ID
}

fn default_exp_no() -> i32 {
    UNKNOWN_EXP_NO
}

impl FrameHeader {
    /// Build the frame record for `path` from this header
    pub fn into_frame(self, path: &Path) -> Result<Frame, StoreError> {
        let observed_at = match (self.mjd, self.date_obs.as_deref()) {
            (Some(mjd), _) => mjd,
            (None, Some(date_obs)) => date_obs_to_mjd(date_obs).ok_or_else(|| {
                StoreError::InvalidMetadata {
                    path: path.to_path_buf(),
                    message: format!("unparseable date_obs '{}'", date_obs),
                }
            })?,
            (None, None) => {
                return Err(StoreError::InvalidMetadata {
                    path: path.to_path_buf(),
                    message: "neither mjd nor date_obs present".to_string(),
                })
            }
        };

        Ok(Frame {
            filename: path.to_path_buf(),
            observed_at,
            frame_type: self.frame_type,
            filter: self.filter,
            exposure_time: self.exptime,
            coadds: self.ncoadds,
            ra: self.ra,
            dec: self.dec,
            ob_id: self.ob_id,
            exp_no: self.exp_no,
            n_exp: self.n_exp,
            from_planning_tool: self.from_planning_tool,
            shape: self.shape,
        })
    }
}

/// Convert an ISO-8601 DATE-OBS value (with or without offset) to MJD
pub fn date_obs_to_mjd(date_obs: &str) -> Option<Mjd> {
    let datetime = DateTime::parse_from_rfc3339(date_obs)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(date_obs, "%Y-%m-%dT%H:%M:%S%.f").map(|dt| dt.and_utc())
        })
        .ok()?;
    let seconds = datetime.timestamp() as f64 + f64::from(datetime.timestamp_subsec_micros()) / 1e6;
    Some(seconds / 86_400.0 + MJD_UNIX_EPOCH)
}

/// Reads `<frame><suffix>` JSON sidecars
#[derive(Debug, Clone)]
pub struct SidecarHeaderReader {
    suffix: String,
}

impl SidecarHeaderReader {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }

    /// Path of the sidecar describing `path`; a sidecar path maps to itself
    pub fn sidecar_path(&self, path: &Path) -> PathBuf {
        let raw = path.to_string_lossy();
        if raw.ends_with(&self.suffix) {
            path.to_path_buf()
        } else {
            PathBuf::from(format!("{}{}", raw, self.suffix))
        }
    }

    /// Frame path described by a sidecar path
    pub fn frame_path(&self, path: &Path) -> PathBuf {
        let raw = path.to_string_lossy();
        match raw.strip_suffix(&self.suffix) {
            Some(stripped) => PathBuf::from(stripped),
            None => path.to_path_buf(),
        }
    }
}

impl Default for SidecarHeaderReader {
    fn default() -> Self {
        Self::new(".json")
    }
}

impl HeaderReader for SidecarHeaderReader {
    fn read(&self, path: &Path) -> Result<Frame, StoreError> {
        let sidecar = self.sidecar_path(path);
        let content =
            std::fs::read_to_string(&sidecar).map_err(|e| StoreError::HeaderUnreadable {
                path: sidecar.clone(),
                message: e.to_string(),
            })?;
        let header: FrameHeader = serde_json::from_str(&content).map_err(|e| {
            if e.is_eof() {
                StoreError::IncompleteHeader {
                    path: sidecar.clone(),
                }
            } else {
                StoreError::InvalidMetadata {
                    path: sidecar.clone(),
                    message: e.to_string(),
                }
            }
        })?;
        header.into_frame(&self.frame_path(path))
    }
}
