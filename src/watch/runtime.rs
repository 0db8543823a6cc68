//! Directory watcher feeding frame notifications to the driver loop.

use super::events::{FileNotification, FrameFile, FrameFileFilter};
use crate::config::WatchConfig;
use crate::error::ApiError;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Frames already on disk, in file name order, followed by a refresh marker
pub fn scan_existing(dir: &Path, filter: &FrameFileFilter) -> Vec<FileNotification> {
    let mut frames: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry during scan");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| match filter.classify(entry.path()) {
            Some(FrameFile::Sidecar { frame }) if frame.is_file() => Some(frame),
            _ => None,
        })
        .collect();
    frames.sort();

    let mut notifications: Vec<FileNotification> =
        frames.into_iter().map(FileNotification::Arrived).collect();
    if !notifications.is_empty() {
        notifications.push(FileNotification::Refresh(dir.to_path_buf()));
    }
    notifications
}

/// Keeps the OS watch alive; dropping it stops notifications
pub struct FrameWatcher {
    _watcher: RecommendedWatcher,
}

impl FrameWatcher {
    /// Start watching `config.input_dir`, optionally announcing existing frames first
    pub fn start(
        config: &WatchConfig,
        tx: UnboundedSender<FileNotification>,
    ) -> Result<Self, ApiError> {
        let filter = FrameFileFilter::new(&config.extensions, config.header_suffix.clone());

        if !config.input_dir.is_dir() {
            return Err(ApiError::WatchError(format!(
                "Input directory does not exist: {}",
                config.input_dir.display()
            )));
        }

        if config.scan_existing {
            let existing = scan_existing(&config.input_dir, &filter);
            info!(count = existing.len(), dir = ?config.input_dir, "Scanned existing frames");
            for notification in existing {
                if tx.send(notification).is_err() {
                    return Err(ApiError::WatchError(
                        "Notification receiver dropped".to_string(),
                    ));
                }
            }
        }

        let event_filter = filter.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    for notification in event_filter.convert_event(&event) {
                        debug!(notification = %notification, "Frame notification");
                        if tx.send(notification).is_err() {
                            debug!("Notification receiver dropped");
                            return;
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Watch error"),
            }
        })?;

        watcher.watch(&config.input_dir, RecursiveMode::Recursive)?;
        info!(dir = ?config.input_dir, "Watching for frames");

        Ok(Self {
            _watcher: watcher,
        })
    }
}
