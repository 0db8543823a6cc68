//! Frame arrival watching.

pub mod events;
pub mod runtime;

pub use events::{FileNotification, FrameFileFilter, DELETION_MARKER, REFRESH_MARKER};
pub use runtime::{scan_existing, FrameWatcher};
