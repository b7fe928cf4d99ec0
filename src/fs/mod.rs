// src/fs/mod.rs

use std::fmt::Debug;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::time::SystemTime;

use anyhow::{Context, Result};

pub mod mock;

/// The subset of file metadata the fingerprint fallback needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
    pub len: u64,
    pub modified: Option<SystemTime>,
}

/// Abstract filesystem interface.
pub trait FileSystem: Send + Sync + Debug {
    /// Open a file for reading without taking an exclusive lock.
    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>>;
    fn metadata(&self, path: &Path) -> Result<FileMeta>;
}

/// Implementation that uses `std::fs`.
///
/// `File::open` requests shared read access on every platform (on Windows std
/// opens with read, write and delete sharing), so a concurrent writer that is
/// replacing the artifact is never blocked by the fingerprinter.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        let file = fs::File::open(path).with_context(|| format!("opening file {:?}", path))?;
        Ok(Box::new(file))
    }

    fn metadata(&self, path: &Path) -> Result<FileMeta> {
        let meta = fs::metadata(path).with_context(|| format!("reading metadata of {:?}", path))?;
        Ok(FileMeta {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}
