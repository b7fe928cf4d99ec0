// src/config/validate.rs

use std::path::PathBuf;
use std::time::Duration;

use crate::config::model::{
    ConfigFile, ProcessSection, ProcessSettings, RawConfigFile, TargetSettings,
};
use crate::errors::{BinwatchError, Result};
use crate::process::{find_executable, Backoff, CommandTemplate};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = BinwatchError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let target = validate_target(&raw)?;
        validate_watch(&raw)?;
        validate_modes(&raw)?;
        let process = raw.process.as_ref().map(validate_process).transpose()?;
        Ok(ConfigFile::new_unchecked(target, raw.watch, raw.reload, process))
    }
}

fn config_error(msg: impl Into<String>) -> BinwatchError {
    BinwatchError::ConfigError(msg.into())
}

fn validate_target(cfg: &RawConfigFile) -> Result<TargetSettings> {
    let directory: PathBuf = cfg
        .watch
        .target_directory
        .clone()
        .ok_or_else(|| config_error("[watch].target_directory is required"))?;

    if !directory.is_dir() {
        return Err(config_error(format!(
            "target directory {} does not exist or is not a directory",
            directory.display()
        )));
    }

    let filename = cfg
        .watch
        .target_filename
        .clone()
        .unwrap_or_default();
    let filename = filename.trim().to_string();
    if filename.is_empty() {
        return Err(config_error("[watch].target_filename must not be empty"));
    }
    if filename.contains('/') || filename.contains('\\') {
        return Err(config_error(format!(
            "[watch].target_filename must be a bare file name (got '{filename}')"
        )));
    }

    let path = directory.join(&filename);
    if !path.is_file() {
        return Err(config_error(format!(
            "target file {} does not exist",
            path.display()
        )));
    }

    Ok(TargetSettings {
        directory,
        filename,
    })
}

fn validate_watch(cfg: &RawConfigFile) -> Result<()> {
    if cfg.watch.debounce_window_ms == 0 {
        return Err(config_error("[watch].debounce_window_ms must be >= 1 (got 0)"));
    }
    if cfg.watch.poll_interval_s == 0 && !cfg.watch.use_notifications {
        return Err(config_error(
            "[watch].poll_interval_s is 0 and notifications are disabled; nothing would detect changes",
        ));
    }
    Ok(())
}

fn validate_modes(cfg: &RawConfigFile) -> Result<()> {
    if cfg.watch.watch_enabled && cfg.process.is_some() {
        return Err(config_error(
            "[watch].watch_enabled runs the reloader in-process and cannot be combined with a [process] section",
        ));
    }
    Ok(())
}

fn validate_process(process: &ProcessSection) -> Result<ProcessSettings> {
    let name = process
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| config_error("[process].name is required"))?
        .to_string();

    let template = match (&process.image, &process.command) {
        (Some(_), Some(_)) => {
            return Err(config_error(
                "[process] must set either `image` or `command`, not both",
            ));
        }
        (None, None) => {
            return Err(config_error("[process] must set either `image` or `command`"));
        }
        (Some(image), None) => CommandTemplate::Container {
            runtime: process.runtime.clone(),
            image: image.clone(),
        },
        (None, Some(command)) => CommandTemplate::Shell(command.clone()),
    };

    if let Some(runtime) = template.runtime_binary() {
        if find_executable(runtime).is_none() {
            return Err(config_error(format!(
                "container runtime '{runtime}' not found on PATH"
            )));
        }
    }

    if process.max_start_attempts == 0 {
        return Err(config_error("[process].max_start_attempts must be >= 1 (got 0)"));
    }
    if process.startup_timeout_s == 0 {
        return Err(config_error("[process].startup_timeout_s must be >= 1 (got 0)"));
    }

    Ok(ProcessSettings {
        name,
        template,
        grace_period: Duration::from_secs(process.grace_period_s),
        startup_timeout: Duration::from_secs(process.startup_timeout_s),
        liveness: process.liveness.clone(),
        max_start_attempts: process.max_start_attempts,
        backoff: Backoff::new(
            Duration::from_millis(process.backoff_base_ms),
            Duration::from_millis(process.backoff_max_ms),
        ),
    })
}
