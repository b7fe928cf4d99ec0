#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use binwatch::config::{ConfigFile, ProcessSection, RawConfigFile};
use binwatch::types::LivenessSpec;

/// Write `content` to `dir/name`, replacing the file.
pub fn write_artifact(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).expect("failed to write artifact");
    path
}

/// Builder for `ConfigFile` to simplify test setup.
///
/// Starts from a target at `dir/name` with notifications enabled and
/// test-friendly short timings.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new(dir: &Path, name: &str) -> Self {
        let mut config = RawConfigFile::default();
        config.watch.target_directory = Some(dir.to_path_buf());
        config.watch.target_filename = Some(name.to_string());
        config.watch.debounce_window_ms = 100;
        config.watch.poll_interval_s = 1;
        config.reload.lease_wait_ms = 50;
        config.reload.settle_delay_ms = 0;
        Self { config }
    }

    pub fn watch_enabled(mut self, enabled: bool) -> Self {
        self.config.watch.watch_enabled = enabled;
        self
    }

    pub fn debounce_ms(mut self, ms: u64) -> Self {
        self.config.watch.debounce_window_ms = ms;
        self
    }

    pub fn poll_interval_s(mut self, secs: u64) -> Self {
        self.config.watch.poll_interval_s = secs;
        self
    }

    pub fn notifications(mut self, enabled: bool) -> Self {
        self.config.watch.use_notifications = enabled;
        self
    }

    pub fn settle_delay_ms(mut self, ms: u64) -> Self {
        self.config.reload.settle_delay_ms = ms;
        self
    }

    pub fn lease_wait_ms(mut self, ms: u64) -> Self {
        self.config.reload.lease_wait_ms = ms;
        self
    }

    pub fn recheck_after_reload(mut self, enabled: bool) -> Self {
        self.config.reload.recheck_after_reload = enabled;
        self
    }

    /// Supervise a shell command with fast timings.
    pub fn with_command(mut self, name: &str, command: &str) -> Self {
        let process = self.config.process.get_or_insert_with(fast_process_section);
        process.name = Some(name.to_string());
        process.command = Some(command.to_string());
        process.image = None;
        self
    }

    pub fn with_liveness(mut self, liveness: &str) -> Self {
        let process = self.config.process.get_or_insert_with(fast_process_section);
        process.liveness = liveness
            .parse::<LivenessSpec>()
            .expect("invalid liveness spec in test");
        self
    }

    pub fn with_max_start_attempts(mut self, attempts: u32) -> Self {
        let process = self.config.process.get_or_insert_with(fast_process_section);
        process.max_start_attempts = attempts;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

fn fast_process_section() -> ProcessSection {
    ProcessSection {
        grace_period_s: 1,
        startup_timeout_s: 2,
        backoff_base_ms: 20,
        backoff_max_ms: 100,
        ..ProcessSection::default()
    }
}
