// src/config/model.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::process::{Backoff, CommandTemplate, OrchestratorOptions, ProcessSpec};
use crate::reload::CoordinatorOptions;
use crate::types::LivenessSpec;
use crate::watch::DetectorOptions;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [watch]
/// target_directory = "/srv/models"
/// target_filename = "model.bin"
/// debounce_window_ms = 500
///
/// [process]
/// name = "analyzer"
/// image = "example/analyzer:latest"
/// liveness = "stdout:^ready"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub watch: WatchSection,

    #[serde(default)]
    pub reload: ReloadSection,

    /// Present when an external process is supervised.
    #[serde(default)]
    pub process: Option<ProcessSection>,
}

/// `[watch]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchSection {
    /// Run the detector and reloader inside the host process. Mutually
    /// exclusive with `[process]`.
    #[serde(default)]
    pub watch_enabled: bool,

    #[serde(default)]
    pub target_directory: Option<PathBuf>,

    #[serde(default)]
    pub target_filename: Option<String>,

    #[serde(default = "default_debounce_window_ms")]
    pub debounce_window_ms: u64,

    /// `0` disables polling (requires notifications).
    #[serde(default = "default_poll_interval_s")]
    pub poll_interval_s: u64,

    #[serde(default = "default_true")]
    pub use_notifications: bool,

    #[serde(default)]
    pub verbose: bool,
}

fn default_debounce_window_ms() -> u64 {
    500
}

fn default_poll_interval_s() -> u64 {
    3
}

fn default_true() -> bool {
    true
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            watch_enabled: false,
            target_directory: None,
            target_filename: None,
            debounce_window_ms: default_debounce_window_ms(),
            poll_interval_s: default_poll_interval_s(),
            use_notifications: true,
            verbose: false,
        }
    }
}

/// `[reload]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ReloadSection {
    #[serde(default = "default_lease_wait_ms")]
    pub lease_wait_ms: u64,

    /// Pause before an in-process rebuild so writers can finish.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    #[serde(default)]
    pub recheck_after_reload: bool,
}

fn default_lease_wait_ms() -> u64 {
    1000
}

fn default_settle_delay_ms() -> u64 {
    1000
}

impl Default for ReloadSection {
    fn default() -> Self {
        Self {
            lease_wait_ms: default_lease_wait_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            recheck_after_reload: false,
        }
    }
}

/// `[process]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessSection {
    #[serde(default)]
    pub name: Option<String>,

    /// Container image; mutually exclusive with `command`.
    #[serde(default)]
    pub image: Option<String>,

    /// Shell command template with `{name}`, `{dir}`, `{file}` placeholders.
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default = "default_runtime")]
    pub runtime: String,

    #[serde(default = "default_grace_period_s")]
    pub grace_period_s: u64,

    #[serde(default = "default_startup_timeout_s")]
    pub startup_timeout_s: u64,

    #[serde(default)]
    pub liveness: LivenessSpec,

    #[serde(default = "default_max_start_attempts")]
    pub max_start_attempts: u32,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

fn default_runtime() -> String {
    "docker".to_string()
}

fn default_grace_period_s() -> u64 {
    3
}

fn default_startup_timeout_s() -> u64 {
    30
}

fn default_max_start_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    10_000
}

impl Default for ProcessSection {
    fn default() -> Self {
        Self {
            name: None,
            image: None,
            command: None,
            runtime: default_runtime(),
            grace_period_s: default_grace_period_s(),
            startup_timeout_s: default_startup_timeout_s(),
            liveness: LivenessSpec::default(),
            max_start_attempts: default_max_start_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

/// The watched artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSettings {
    pub directory: PathBuf,
    pub filename: String,
}

impl TargetSettings {
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.filename)
    }
}

/// A validated, resolved managed process.
#[derive(Debug, Clone)]
pub struct ProcessSettings {
    pub name: String,
    pub template: CommandTemplate,
    pub grace_period: Duration,
    pub startup_timeout: Duration,
    pub liveness: LivenessSpec,
    pub max_start_attempts: u32,
    pub backoff: Backoff,
}

/// Validated configuration.
///
/// Only produced by `TryFrom<RawConfigFile>` (or `new_unchecked` in tests).
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub target: TargetSettings,
    pub watch: WatchSection,
    pub reload: ReloadSection,
    pub process: Option<ProcessSettings>,
}

impl ConfigFile {
    /// Construct without validation. Intended for tests and for callers that
    /// already validated the parts themselves.
    pub fn new_unchecked(
        target: TargetSettings,
        watch: WatchSection,
        reload: ReloadSection,
        process: Option<ProcessSettings>,
    ) -> Self {
        Self {
            target,
            watch,
            reload,
            process,
        }
    }

    pub fn target_directory(&self) -> &Path {
        &self.target.directory
    }

    pub fn target_filename(&self) -> &str {
        &self.target.filename
    }

    pub fn detector_options(&self) -> DetectorOptions {
        DetectorOptions {
            debounce: Duration::from_millis(self.watch.debounce_window_ms),
            poll_interval: match self.watch.poll_interval_s {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }

    pub fn coordinator_options(&self) -> CoordinatorOptions {
        CoordinatorOptions {
            lease_wait: Duration::from_millis(self.reload.lease_wait_ms),
            recheck_after_reload: self.reload.recheck_after_reload,
        }
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.reload.settle_delay_ms)
    }

    /// Orchestrator options for the configured process, or the defaults.
    pub fn orchestrator_options(&self) -> OrchestratorOptions {
        let mut options = OrchestratorOptions::default();
        if let Some(process) = &self.process {
            options.grace_period = process.grace_period;
            options.startup_timeout = process.startup_timeout;
            options.max_start_attempts = process.max_start_attempts;
            options.backoff = process.backoff;
        }
        options
    }

    pub fn process_spec(&self) -> Option<ProcessSpec> {
        self.process.as_ref().map(|process| ProcessSpec {
            identity: process.name.clone(),
            template: process.template.clone(),
            directory: self.target.directory.clone(),
            filename: self.target.filename.clone(),
            liveness: process.liveness.clone(),
        })
    }
}
