//! Quicklook: Quick-Look Orchestration for Near-Infrared Imaging
//!
//! Watches incoming frames, groups them into observing sequences, picks the
//! master calibrations each sequence needs and runs reductions one at a time
//! so that each product is available as a calibration for the next.

pub mod calibration;
pub mod config;
pub mod driver;
pub mod error;
pub mod frame;
pub mod logging;
pub mod pipeline;
pub mod scheduler;
pub mod sequence;
pub mod store;
pub mod tooling;
pub mod types;
pub mod watch;
