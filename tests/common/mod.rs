#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::mpsc;

use binwatch::fs::mock::MockFileSystem;
use binwatch::watch::{
    ChangeDetector, ChangeEvent, DetectorHandle, DetectorOptions, Fingerprint, NotificationSource,
    WatchTarget,
};

pub use binwatch_test_utils::builders::{write_artifact, ConfigFileBuilder};
pub use binwatch_test_utils::fake_reloader::RecordingReloader;
pub use binwatch_test_utils::manual_source::{ManualHints, ManualSource};
pub use binwatch_test_utils::{capture_logs, init_tracing, with_timeout, CapturedLogs};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub const MODEL_DIR: &str = "/srv/models";
pub const MODEL_FILE: &str = "model.bin";

pub fn model_path() -> PathBuf {
    Path::new(MODEL_DIR).join(MODEL_FILE)
}

/// Mock filesystem holding `/srv/models/model.bin` with `content`.
pub fn mock_fs_with_model(content: &[u8]) -> MockFileSystem {
    let fs = MockFileSystem::new();
    fs.add_file(model_path(), content.to_vec());
    fs
}

/// Spawn a detector over the mock filesystem and wait for its baseline.
pub async fn spawn_detector(
    fs: &MockFileSystem,
    dir: &str,
    source: Option<Box<dyn NotificationSource>>,
    options: DetectorOptions,
) -> (DetectorHandle, mpsc::Receiver<ChangeEvent>) {
    let target = WatchTarget::new(dir, MODEL_FILE).expect("valid target");
    let (tx, rx) = mpsc::channel(16);
    let mut handle = ChangeDetector::new(target, Arc::new(fs.clone()), source, options).spawn(tx);
    handle
        .fingerprint_changed()
        .await
        .expect("detector should publish a baseline");
    (handle, rx)
}

/// A change event for `content`, as the detector would emit it.
pub fn change_event(content: &[u8]) -> ChangeEvent {
    ChangeEvent {
        path: model_path(),
        fingerprint: Fingerprint::from_content(content),
        previous: None,
        timestamp: SystemTime::now(),
    }
}
