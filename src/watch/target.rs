// src/watch/target.rs

//! The watched artifact and the single "is this a real change" decision.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use globset::{Glob, GlobMatcher};
use tracing::{debug, info};

use crate::fs::FileSystem;
use crate::watch::fingerprint::{fingerprint_file, Fingerprint};

/// A confirmed content change of the watched artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub fingerprint: Fingerprint,
    pub previous: Option<Fingerprint>,
    pub timestamp: SystemTime,
}

/// One monitored artifact: a file name inside a directory plus the last
/// fingerprint that was accepted for it.
///
/// Only the detection loop mutates a `WatchTarget`, so it carries no lock.
#[derive(Debug, Clone)]
pub struct WatchTarget {
    directory: PathBuf,
    filename: String,
    filter: GlobMatcher,
    fingerprint: Option<Fingerprint>,
    last_change: Option<SystemTime>,
}

impl WatchTarget {
    pub fn new(directory: impl Into<PathBuf>, filename: impl Into<String>) -> Result<Self> {
        let filename = filename.into();
        let pattern = filter_pattern(&filename);
        let filter = Glob::new(&pattern)
            .with_context(|| format!("invalid filename filter '{pattern}'"))?
            .compile_matcher();

        Ok(Self {
            directory: directory.into(),
            filename,
            filter,
            fingerprint: None,
            last_change: None,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Full path of the artifact.
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.filename)
    }

    pub fn fingerprint(&self) -> Option<Fingerprint> {
        self.fingerprint
    }

    pub fn last_change(&self) -> Option<SystemTime> {
        self.last_change
    }

    /// Whether a raw notification for `path` is relevant to this target.
    ///
    /// The extension filter discards unrelated files; siblings that share the
    /// extension pass and are later settled by the fingerprint comparison.
    pub fn accepts(&self, path: &Path) -> bool {
        path.file_name()
            .map(|name| self.filter.is_match(Path::new(name)))
            .unwrap_or(false)
    }

    /// Record the current fingerprint without emitting anything.
    pub fn baseline(&mut self, fs: &dyn FileSystem) -> Fingerprint {
        let fp = fingerprint_file(fs, &self.path());
        info!(
            path = ?self.path(),
            fingerprint = %fp.short(),
            origin = ?fp.origin(),
            "recorded baseline fingerprint"
        );
        self.fingerprint = Some(fp);
        fp
    }

    /// Point the target at a new directory; the next step must be a fresh
    /// [`baseline`](Self::baseline).
    pub fn retarget(&mut self, directory: impl Into<PathBuf>) {
        self.directory = directory.into();
        self.fingerprint = None;
        self.last_change = None;
    }

    /// Re-fingerprint the artifact and decide whether it really changed.
    ///
    /// Both the notification path and the polling path end up here.
    pub fn observe(&mut self, fs: &dyn FileSystem) -> Option<ChangeEvent> {
        let path = self.path();
        let new = fingerprint_file(fs, &path);
        self.accept(path, new)
    }

    fn accept(&mut self, path: PathBuf, new: Fingerprint) -> Option<ChangeEvent> {
        let previous = self.fingerprint;

        if previous == Some(new) {
            debug!(?path, fingerprint = %new.short(), "fingerprint unchanged; ignoring");
            return None;
        }

        // Only content can confirm a change; metadata churn never emits.
        if !new.is_content() {
            if previous.is_none_or(|old| !old.is_content()) {
                self.fingerprint = Some(new);
            }
            debug!(
                ?path,
                stored = %previous.map(|p| p.short()).unwrap_or_else(|| "-".to_string()),
                "artifact content unreadable; waiting for readable content"
            );
            return None;
        }

        let now = SystemTime::now();
        self.fingerprint = Some(new);
        self.last_change = Some(now);

        info!(
            ?path,
            previous = %previous.map(|p| p.short()).unwrap_or_else(|| "-".to_string()),
            fingerprint = %new.short(),
            "artifact content changed"
        );

        Some(ChangeEvent {
            path,
            fingerprint: new,
            previous,
            timestamp: now,
        })
    }
}

/// `model.bin` → `*.bin`; names without an extension match exactly.
fn filter_pattern(filename: &str) -> String {
    match Path::new(filename).extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => format!("*.{ext}"),
        _ => globset_escape(filename),
    }
}

fn globset_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '{' | '}') {
            out.push('[');
            out.push(c);
            out.push(']');
        } else {
            out.push(c);
        }
    }
    out
}
