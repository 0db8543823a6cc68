//! Core types shared across the quick-look orchestration layer.

/// Mjd: Modified Julian Date of an observation, the monotonic ordering key of frames
pub type Mjd = f64;

/// JobId: Submission-ordered identifier of a scheduled job
pub type JobId = u64;

/// Observing-block identity used when the header carries none
pub const UNKNOWN_OB_ID: i64 = -1;

/// Pattern position used when the header carries none
pub const UNKNOWN_EXP_NO: i32 = -1;
