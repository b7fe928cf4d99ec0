// src/watch/source.rs

//! Filesystem notification sources.
//!
//! A notification is only a hint that the artifact *might* have changed; the
//! detector always confirms with a fingerprint. Sources therefore forward raw
//! paths and nothing else.

use std::path::{Path, PathBuf};

use anyhow::Result;
use notify::event::{AccessKind, AccessMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Channel on which sources deliver raw notification paths.
pub type HintSender = mpsc::UnboundedSender<PathBuf>;

/// Uniform interface over platform notification backends.
///
/// Production code uses [`NotifySource`]; tests can provide their own
/// implementation that forwards hints on demand.
pub trait NotificationSource: Send {
    /// Start delivering notifications for entries of `directory`.
    ///
    /// Replaces any previous subscription.
    fn subscribe(&mut self, directory: &Path, hints: HintSender) -> Result<()>;

    /// Drop the current subscription, if any.
    fn unsubscribe(&mut self);
}

/// Notification source backed by `notify`'s `RecommendedWatcher`
/// (inotify, FSEvents, ReadDirectoryChangesW, kqueue).
#[derive(Default)]
pub struct NotifySource {
    watcher: Option<RecommendedWatcher>,
    directory: Option<PathBuf>,
}

impl std::fmt::Debug for NotifySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifySource")
            .field("directory", &self.directory)
            .finish_non_exhaustive()
    }
}

impl NotifySource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NotificationSource for NotifySource {
    fn subscribe(&mut self, directory: &Path, hints: HintSender) -> Result<()> {
        self.unsubscribe();

        // Closure called synchronously by notify whenever an event arrives.
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !is_relevant(&event.kind) {
                        return;
                    }
                    for path in event.paths {
                        if hints.send(path).is_err() {
                            // Detector is gone; nothing left to notify.
                            return;
                        }
                    }
                }
                Err(err) => {
                    warn!(error = %err, "file watch error");
                }
            },
            Config::default(),
        )?;

        watcher.watch(directory, RecursiveMode::NonRecursive)?;
        info!(?directory, "subscribed to file notifications");

        self.watcher = Some(watcher);
        self.directory = Some(directory.to_path_buf());
        Ok(())
    }

    fn unsubscribe(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            if let Some(dir) = self.directory.take() {
                if let Err(err) = watcher.unwatch(&dir) {
                    debug!(?dir, error = %err, "unwatch failed; dropping watcher anyway");
                }
            }
            debug!("unsubscribed from file notifications");
        }
    }
}

/// Reads are not changes; our own fingerprinting would otherwise feed back
/// into the detector on platforms that report opens.
fn is_relevant(kind: &EventKind) -> bool {
    match kind {
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => true,
        EventKind::Access(_) => false,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, MetadataKind, ModifyKind};

    #[test]
    fn read_access_is_not_forwarded() {
        assert!(!is_relevant(&EventKind::Access(AccessKind::Open(AccessMode::Read))));
        assert!(!is_relevant(&EventKind::Access(AccessKind::Close(AccessMode::Read))));
        assert!(is_relevant(&EventKind::Access(AccessKind::Close(AccessMode::Write))));
    }

    #[test]
    fn writes_creates_and_metadata_touches_are_hints() {
        assert!(is_relevant(&EventKind::Create(CreateKind::File)));
        assert!(is_relevant(&EventKind::Modify(ModifyKind::Metadata(
            MetadataKind::WriteTime
        ))));
    }
}
