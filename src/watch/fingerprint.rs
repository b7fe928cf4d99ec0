// src/watch/fingerprint.rs

//! Content fingerprinting of the watched artifact.

use std::fmt;
use std::io::Read;
use std::path::Path;
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use blake3::Hasher;
use tracing::{trace, warn};

use crate::fs::FileSystem;

/// Where a fingerprint's digest came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FingerprintOrigin {
    /// BLAKE3 over the full byte stream.
    Content,
    /// Synthetic digest over modification time and size (or an "absent"
    /// marker) because the content could not be read.
    Metadata,
}

/// A fixed-length fingerprint of a file.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    digest: [u8; 32],
    origin: FingerprintOrigin,
}

impl Fingerprint {
    pub fn from_content(bytes: &[u8]) -> Self {
        Self {
            digest: *blake3::hash(bytes).as_bytes(),
            origin: FingerprintOrigin::Content,
        }
    }

    pub fn origin(&self) -> FingerprintOrigin {
        self.origin
    }

    pub fn is_content(&self) -> bool {
        self.origin == FingerprintOrigin::Content
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.digest
    }

    pub fn to_hex(&self) -> String {
        blake3::Hash::from_bytes(self.digest).to_hex().to_string()
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(12);
        hex
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({:?}, {})", self.origin, self.short())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Compute the content hash of a single file.
pub fn compute_content_fingerprint(fs: &dyn FileSystem, path: &Path) -> Result<Fingerprint> {
    let mut hasher = Hasher::new();
    let mut file = fs
        .open_read(path)
        .with_context(|| format!("opening file for fingerprinting: {:?}", path))?;
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("reading {:?}", path))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(Fingerprint {
        digest: *hasher.finalize().as_bytes(),
        origin: FingerprintOrigin::Content,
    })
}

/// Synthetic fingerprint from modification time and size.
pub fn metadata_fingerprint(fs: &dyn FileSystem, path: &Path) -> Fingerprint {
    let mut hasher = Hasher::new();
    match fs.metadata(path) {
        Ok(meta) => {
            hasher.update(b"meta");
            hasher.update(&meta.len.to_le_bytes());
            let nanos = meta
                .modified
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_nanos())
                .unwrap_or(0);
            hasher.update(&nanos.to_le_bytes());
        }
        Err(_) => {
            hasher.update(b"absent");
        }
    }
    Fingerprint {
        digest: *hasher.finalize().as_bytes(),
        origin: FingerprintOrigin::Metadata,
    }
}

/// Fingerprint `path`, never failing.
///
/// Read errors (locked, vanished, denied) are logged and answered with a
/// [`FingerprintOrigin::Metadata`] fingerprint.
pub fn fingerprint_file(fs: &dyn FileSystem, path: &Path) -> Fingerprint {
    match compute_content_fingerprint(fs, path) {
        Ok(fp) => {
            trace!(?path, fingerprint = %fp.short(), "computed content fingerprint");
            fp
        }
        Err(err) => {
            let fp = metadata_fingerprint(fs, path);
            warn!(
                ?path,
                error = %format!("{err:#}"),
                fallback = %fp.short(),
                "could not read artifact; using metadata fingerprint"
            );
            fp
        }
    }
}
