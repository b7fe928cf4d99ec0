// src/config/mod.rs

//! Configuration loading and validation for binwatch.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk and overlay CLI flags (`loader.rs`).
//! - Validate paths, launch settings and mode exclusivity (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{apply_cli_overrides, load_and_validate, load_from_path, load_with_overrides};
pub use model::{
    ConfigFile, ProcessSection, ProcessSettings, RawConfigFile, ReloadSection, TargetSettings,
    WatchSection,
};
