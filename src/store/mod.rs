//! Frame Metadata Store
//!
//! Provides lookup storage for frame metadata. Two instances are used at
//! runtime: one indexing incoming raw frames and one indexing reduction
//! products. Query results are always ordered by observation date, oldest first.

pub mod header;
pub mod memory;

use crate::error::StoreError;
use crate::frame::{Frame, FrameType};
use std::path::Path;

pub use header::{FrameHeader, HeaderReader, SidecarHeaderReader};
pub use memory::MemoryStore;

/// Exposure times closer than this are considered equal (seconds)
pub const EXPTIME_TOLERANCE: f64 = 1e-3;

/// Query over the frames of one type
#[derive(Debug, Clone, PartialEq)]
pub struct FrameQuery {
    pub frame_type: FrameType,
    /// None matches any exposure time
    pub exposure_time: Option<f64>,
    /// None matches any filter
    pub filter: Option<String>,
    /// None matches any coadd count
    pub coadds: Option<u32>,
    /// (ra, dec, radius) in degrees, degrees and arcsec
    pub near: Option<(f64, f64, f64)>,
}

impl FrameQuery {
    pub fn of_type(frame_type: FrameType) -> Self {
        Self {
            frame_type,
            exposure_time: None,
            filter: None,
            coadds: None,
            near: None,
        }
    }

    pub fn exposure_time(mut self, exposure_time: f64) -> Self {
        self.exposure_time = Some(exposure_time);
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn coadds(mut self, coadds: u32) -> Self {
        self.coadds = Some(coadds);
        self
    }

    pub fn near(mut self, ra: f64, dec: f64, radius_arcsec: f64) -> Self {
        self.near = Some((ra, dec, radius_arcsec));
        self
    }

    /// Check a frame against every constraint of the query
    pub fn matches(&self, frame: &Frame) -> bool {
        if frame.frame_type != self.frame_type {
            return false;
        }
        if let Some(exptime) = self.exposure_time {
            if (frame.exposure_time - exptime).abs() > EXPTIME_TOLERANCE {
                return false;
            }
        }
        if let Some(filter) = &self.filter {
            if !filter.eq_ignore_ascii_case(&frame.filter) {
                return false;
            }
        }
        if let Some(coadds) = self.coadds {
            if frame.coadds != coadds {
                return false;
            }
        }
        if let Some((ra, dec, radius)) = self.near {
            if pointing_distance_arcsec(ra, dec, frame.ra, frame.dec) > radius {
                return false;
            }
        }
        true
    }
}

/// Planar distance between two pointings, in arcsec
pub fn pointing_distance_arcsec(ra1: f64, dec1: f64, ra2: f64, dec2: f64) -> f64 {
    let d_ra = ra1 - ra2;
    let d_dec = dec1 - dec2;
    (d_ra * d_ra + d_dec * d_dec).sqrt() * 3600.0
}

/// Metadata store interface
pub trait MetadataStore: Send + Sync {
    /// Register a file; returns false if it was already registered
    fn insert(&self, path: &Path) -> Result<bool, StoreError>;

    /// Remove a file; returns false if it was not registered
    fn delete(&self, path: &Path) -> Result<bool, StoreError>;

    /// Frames matching the query, ascending by observation date
    fn files_of_type(&self, query: &FrameQuery) -> Result<Vec<Frame>, StoreError>;

    fn file_info(&self, path: &Path) -> Result<Option<Frame>, StoreError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&self);
}
