// src/logging.rs

//! Logging setup for `binwatch` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `BINWATCH_LOG` environment variable (e.g. "info", "debug")
//! 3. default to `info`
//!
//! `--verbose` raises the crate's own targets to `debug` on top of the chosen
//! level, which is where change, reload and process-transition details live.
//!
//! Logs are sent to STDERR so that stdout stays free for `--dry-run` output.

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>, verbose: bool) -> Result<()> {
    let level = match cli_level {
        Some(lvl) => level_from_log_level(lvl),
        None => std::env::var("BINWATCH_LOG")
            .ok()
            .and_then(|s| parse_level_str(&s))
            .unwrap_or(tracing::Level::INFO),
    };

    let filter = EnvFilter::new(filter_directives(level, verbose));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))?;

    Ok(())
}

/// Build the `EnvFilter` directive string for a base level.
pub fn filter_directives(level: tracing::Level, verbose: bool) -> String {
    let base = level.as_str().to_lowercase();
    if verbose && level < tracing::Level::DEBUG {
        format!("{base},binwatch=debug")
    } else {
        base
    }
}

fn level_from_log_level(lvl: LogLevel) -> tracing::Level {
    match lvl {
        LogLevel::Error => tracing::Level::ERROR,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Trace => tracing::Level::TRACE,
    }
}

fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_adds_crate_debug_directive() {
        assert_eq!(filter_directives(tracing::Level::INFO, false), "info");
        assert_eq!(
            filter_directives(tracing::Level::WARN, true),
            "warn,binwatch=debug"
        );
        // Already at least as verbose as debug.
        assert_eq!(filter_directives(tracing::Level::TRACE, true), "trace");
    }

    #[test]
    fn env_level_strings() {
        assert_eq!(parse_level_str(" Warning "), Some(tracing::Level::WARN));
        assert_eq!(parse_level_str("loud"), None);
    }
}
