// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `binwatch`.
///
/// Every flag that maps onto a configuration key overrides the value loaded
/// from `--config`.
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "binwatch",
    version,
    about = "Supervise a server process and restart it when its binary artifact changes.",
    long_about = None
)]
pub struct CliArgs {
    /// Optional TOML config file.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory that contains the watched artifact.
    #[arg(long, value_name = "DIR")]
    pub target_dir: Option<PathBuf>,

    /// File name of the watched artifact inside `--target-dir`.
    #[arg(long, value_name = "NAME")]
    pub target_file: Option<String>,

    /// Identity of the managed process (also used as the container name).
    #[arg(long, value_name = "ID")]
    pub name: Option<String>,

    /// Container image reference to run as the managed process.
    #[arg(long, value_name = "REF", conflicts_with = "command")]
    pub image: Option<String>,

    /// Explicit command template; `{dir}`, `{file}` and `{name}` are substituted.
    #[arg(long, value_name = "TEMPLATE")]
    pub command: Option<String>,

    /// Container runtime binary used with `--image`.
    #[arg(long, value_name = "BIN")]
    pub runtime: Option<String>,

    /// Polling interval for the artifact, in seconds.
    #[arg(long, value_name = "SECS")]
    pub watch_interval: Option<u64>,

    /// Debounce window for file notifications, in milliseconds.
    #[arg(long, value_name = "MS")]
    pub debounce_ms: Option<u64>,

    /// Grace period between SIGTERM and a forced kill, in seconds.
    #[arg(long, value_name = "SECS")]
    pub grace_period: Option<u64>,

    /// Ignore filesystem notifications and rely on polling only.
    #[arg(long)]
    pub poll_only: bool,

    /// Log change, reload and process-transition events at debug level.
    #[arg(short, long)]
    pub verbose: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `BINWATCH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Validate the configuration, print it, and exit.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
