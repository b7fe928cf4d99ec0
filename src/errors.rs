// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BinwatchError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("File notification error: {0}")]
    NotifyError(#[from] notify::Error),

    #[error("Unknown managed process: {0}")]
    UnknownProcess(String),

    #[error("Failed to spawn managed process '{identity}': {source}")]
    SpawnFailed {
        identity: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Managed process '{identity}' did not report liveness within {timeout:?}")]
    StartupTimeout { identity: String, timeout: Duration },

    #[error("Managed process '{identity}' exited during startup (code {code:?})")]
    ExitedDuringStartup { identity: String, code: Option<i32> },

    #[error("Managed process '{identity}' failed to start after {attempts} attempts")]
    RetryBudgetExhausted { identity: String, attempts: u32 },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, BinwatchError>;
