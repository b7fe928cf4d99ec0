// src/config/loader.rs

use std::fs;
use std::path::Path;

use crate::cli::CliArgs;
use crate::config::model::{ConfigFile, ProcessSection, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and run validation.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Resolve the configuration for the binary: optional file, then CLI
/// overrides, then validation.
pub fn load_with_overrides(args: &CliArgs) -> Result<ConfigFile> {
    let mut raw = match &args.config {
        Some(path) => load_from_path(path)?,
        None => RawConfigFile::default(),
    };
    apply_cli_overrides(&mut raw, args);
    ConfigFile::try_from(raw)
}

/// Overlay explicitly given CLI flags onto `raw`.
///
/// Process flags create a `[process]` section if the file had none.
pub fn apply_cli_overrides(raw: &mut RawConfigFile, args: &CliArgs) {
    if let Some(dir) = &args.target_dir {
        raw.watch.target_directory = Some(dir.clone());
    }
    if let Some(file) = &args.target_file {
        raw.watch.target_filename = Some(file.clone());
    }
    if let Some(secs) = args.watch_interval {
        raw.watch.poll_interval_s = secs;
    }
    if let Some(ms) = args.debounce_ms {
        raw.watch.debounce_window_ms = ms;
    }
    if args.poll_only {
        raw.watch.use_notifications = false;
    }
    if args.verbose {
        raw.watch.verbose = true;
    }

    let touches_process = args.name.is_some()
        || args.image.is_some()
        || args.command.is_some()
        || args.runtime.is_some()
        || args.grace_period.is_some();
    if !touches_process {
        return;
    }

    let process = raw.process.get_or_insert_with(ProcessSection::default);
    if let Some(name) = &args.name {
        process.name = Some(name.clone());
    }
    // The two launch forms replace each other.
    if let Some(image) = &args.image {
        process.image = Some(image.clone());
        process.command = None;
    }
    if let Some(command) = &args.command {
        process.command = Some(command.clone());
        process.image = None;
    }
    if let Some(runtime) = &args.runtime {
        process.runtime = runtime.clone();
    }
    if let Some(secs) = args.grace_period {
        process.grace_period_s = secs;
    }
}
