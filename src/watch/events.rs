//! Frame notifications and filesystem event conversion.
//!
//! The acquisition system writes the JSON header sidecar after the frame
//! itself, so a sidecar appearing is what announces a frame. Removing either
//! file retracts it.
//!
//! A sidecar is usually created empty and filled afterwards, so content writes
//! and the final close announce it again. The stores ignore repeated inserts.

use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{Event, EventKind};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Suffix marking a textual notification as a removal
pub const DELETION_MARKER: &str = "__deleted__";

/// Suffix marking a textual notification as a display refresh
pub const REFRESH_MARKER: &str = "__refresh__";

/// Notification delivered to the driver loop
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileNotification {
    Arrived(PathBuf),
    Removed(PathBuf),
    /// Coalesces display updates; carries no frame
    Refresh(PathBuf),
}

impl FileNotification {
    pub fn path(&self) -> &Path {
        match self {
            FileNotification::Arrived(p)
            | FileNotification::Removed(p)
            | FileNotification::Refresh(p) => p,
        }
    }
}

impl fmt::Display for FileNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileNotification::Arrived(p) => write!(f, "{}", p.display()),
            FileNotification::Removed(p) => write!(f, "{}{}", p.display(), DELETION_MARKER),
            FileNotification::Refresh(p) => write!(f, "{}{}", p.display(), REFRESH_MARKER),
        }
    }
}

impl FromStr for FileNotification {
    type Err = std::convert::Infallible;

    /// Parse the marker form used by watcher front-ends
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(path) = s.strip_suffix(DELETION_MARKER) {
            Ok(FileNotification::Removed(PathBuf::from(path)))
        } else if let Some(path) = s.strip_suffix(REFRESH_MARKER) {
            Ok(FileNotification::Refresh(PathBuf::from(path)))
        } else {
            Ok(FileNotification::Arrived(PathBuf::from(s)))
        }
    }
}

/// Recognizes frame files and their header sidecars
#[derive(Debug, Clone)]
pub struct FrameFileFilter {
    extensions: Vec<String>,
    header_suffix: String,
}

/// Which of the two files of a frame a path names
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameFile {
    Frame(PathBuf),
    Sidecar { frame: PathBuf },
}

impl FrameFileFilter {
    pub fn new(extensions: &[String], header_suffix: impl Into<String>) -> Self {
        Self {
            extensions: extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            header_suffix: header_suffix.into(),
        }
    }

    pub fn is_frame(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| {
                let ext = ext.to_string_lossy().to_ascii_lowercase();
                self.extensions.iter().any(|allowed| *allowed == ext)
            })
            .unwrap_or(false)
    }

    pub fn classify(&self, path: &Path) -> Option<FrameFile> {
        let raw = path.to_string_lossy();
        if let Some(stripped) = raw.strip_suffix(&self.header_suffix) {
            let frame = PathBuf::from(stripped);
            return self
                .is_frame(&frame)
                .then_some(FrameFile::Sidecar { frame });
        }
        self.is_frame(path).then(|| FrameFile::Frame(path.to_path_buf()))
    }

    /// Translate one filesystem event into frame notifications
    pub fn convert_event(&self, event: &Event) -> Vec<FileNotification> {
        match event.kind {
            EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Access(AccessKind::Close(AccessMode::Write))
            | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                self.arrivals(event.paths.iter())
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                let mut notifications = Vec::new();
                if let Some(from) = event.paths.first() {
                    notifications.extend(self.removals(std::iter::once(from)));
                }
                if let Some(to) = event.paths.get(1) {
                    notifications.extend(self.arrivals(std::iter::once(to)));
                }
                notifications
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) | EventKind::Remove(_) => {
                self.removals(event.paths.iter())
            }
            _ => Vec::new(),
        }
    }

    fn arrivals<'a>(&self, paths: impl Iterator<Item = &'a PathBuf>) -> Vec<FileNotification> {
        paths
            .filter_map(|p| match self.classify(p) {
                Some(FrameFile::Sidecar { frame }) => Some(FileNotification::Arrived(frame)),
                _ => None,
            })
            .collect()
    }

    fn removals<'a>(&self, paths: impl Iterator<Item = &'a PathBuf>) -> Vec<FileNotification> {
        paths
            .filter_map(|p| match self.classify(p) {
                Some(FrameFile::Sidecar { frame }) | Some(FrameFile::Frame(frame)) => {
                    Some(FileNotification::Removed(frame))
                }
                None => None,
            })
            .collect()
    }
}
