// src/watch/mod.rs

//! Artifact change detection.
//!
//! This module is responsible for:
//! - Fingerprinting the watched artifact by content (BLAKE3), with a
//!   metadata fallback when the file cannot be read.
//! - Turning platform notifications (`notify`) and periodic polls into
//!   debounced, fingerprint-confirmed [`ChangeEvent`]s.
//!
//! It does **not** know what happens on a change; consumers receive events
//! over a channel and decide how to reload.

pub mod debounce;
pub mod detector;
pub mod fingerprint;
pub mod source;
pub mod target;

pub use detector::{ChangeDetector, DetectorHandle, DetectorOptions, FALLBACK_POLL_INTERVAL};
pub use fingerprint::{
    compute_content_fingerprint, fingerprint_file, metadata_fingerprint, Fingerprint,
    FingerprintOrigin,
};
pub use source::{HintSender, NotificationSource, NotifySource};
pub use target::{ChangeEvent, WatchTarget};
