// src/fs/mock.rs

use super::{FileMeta, FileSystem};
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File {
        content: Vec<u8>,
        modified: SystemTime,
        /// Simulates a file that is locked or permission-denied for reads
        /// while its metadata stays visible.
        unreadable: bool,
    },
    Dir,
}

/// In-memory filesystem for tests.
///
/// Modification times advance by one second on every write or touch so that
/// metadata-only churn is observable.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
    clock: Arc<Mutex<u64>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        let mut files = HashMap::new();
        files.insert(PathBuf::from("."), MockEntry::Dir);

        Self {
            files: Arc::new(Mutex::new(files)),
            clock: Arc::new(Mutex::new(0)),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<PathBuf, MockEntry>> {
        self.files.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn tick(&self) -> SystemTime {
        let mut clock = self.clock.lock().unwrap_or_else(|p| p.into_inner());
        *clock += 1;
        SystemTime::UNIX_EPOCH + Duration::from_secs(*clock)
    }

    /// Create or overwrite a file; parent directories are created implicitly.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = path.as_ref().to_path_buf();
        let modified = self.tick();
        let mut files = self.entries();
        let mut parent = path.parent();
        while let Some(dir) = parent {
            if dir.as_os_str().is_empty() {
                break;
            }
            files.entry(dir.to_path_buf()).or_insert(MockEntry::Dir);
            parent = dir.parent();
        }
        files.insert(
            path,
            MockEntry::File {
                content: content.into(),
                modified,
                unreadable: false,
            },
        );
    }

    /// Bump the modification time without changing content.
    pub fn touch(&self, path: impl AsRef<Path>) {
        let now = self.tick();
        if let Some(MockEntry::File { modified, .. }) = self.entries().get_mut(path.as_ref()) {
            *modified = now;
        }
    }

    pub fn set_unreadable(&self, path: impl AsRef<Path>, value: bool) {
        if let Some(MockEntry::File { unreadable, .. }) = self.entries().get_mut(path.as_ref()) {
            *unreadable = value;
        }
    }

    pub fn remove(&self, path: impl AsRef<Path>) {
        self.entries().remove(path.as_ref());
    }
}

impl FileSystem for MockFileSystem {
    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        match self.entries().get(path) {
            Some(MockEntry::File {
                unreadable: true, ..
            }) => Err(anyhow!("Permission denied: {:?}", path)),
            Some(MockEntry::File { content, .. }) => Ok(Box::new(Cursor::new(content.clone()))),
            Some(MockEntry::Dir) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn metadata(&self, path: &Path) -> Result<FileMeta> {
        match self.entries().get(path) {
            Some(MockEntry::File {
                content, modified, ..
            }) => Ok(FileMeta {
                len: content.len() as u64,
                modified: Some(*modified),
            }),
            Some(MockEntry::Dir) => Ok(FileMeta {
                len: 0,
                modified: None,
            }),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }
}
