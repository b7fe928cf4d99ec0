// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod process;
pub mod reload;
pub mod types;
pub mod watch;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_with_overrides;
use crate::config::model::ConfigFile;
use crate::errors::BinwatchError;
use crate::fs::RealFileSystem;
use crate::reload::{InProcessReloader, ReloadCoordinator, SharedState, StateBuilder};
use crate::watch::{ChangeDetector, DetectorHandle, NotificationSource, NotifySource, WatchTarget};

pub use crate::process::request_restart;

/// High-level entry point for the `binwatch` binary.
///
/// Resolves the configuration from `--config` and the CLI flags, then either
/// prints it (`--dry-run`) or supervises the configured process until a
/// shutdown signal.
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_with_overrides(&args)?;
    run_with_config(&args, cfg).await
}

/// Same as [`run`] for an already resolved configuration.
pub async fn run_with_config(args: &CliArgs, cfg: ConfigFile) -> Result<()> {
    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    if cfg.process.is_none() {
        let reason = if cfg.watch.watch_enabled {
            "watch_enabled selects the embedded reloader; the binary needs a managed process (--name with --image or --command)"
        } else {
            "no managed process configured (--name with --image or --command)"
        };
        return Err(BinwatchError::ConfigError(reason.to_string()).into());
    }

    crate::process::run_supervisor(&cfg).await
}

/// A running in-process watch: detector, coordinator and the shared state
/// they keep up to date.
pub struct InProcessWatch<T> {
    state: Arc<SharedState<T>>,
    detector: DetectorHandle,
    coordinator: JoinHandle<()>,
}

impl<T> std::fmt::Debug for InProcessWatch<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcessWatch")
            .field("generation", &self.state.generation())
            .field("detector", &self.detector)
            .finish_non_exhaustive()
    }
}

impl<T> InProcessWatch<T> {
    /// Readers call `load()` on this for the current state.
    pub fn state(&self) -> &Arc<SharedState<T>> {
        &self.state
    }

    pub fn detector(&self) -> &DetectorHandle {
        &self.detector
    }

    pub fn detector_mut(&mut self) -> &mut DetectorHandle {
        &mut self.detector
    }

    /// Stop watching. The last published state stays readable.
    pub async fn shutdown(self) {
        self.detector.shutdown().await;
        // The coordinator ends once the detector drops its event sender.
        if let Err(err) = self.coordinator.await {
            if !err.is_cancelled() {
                warn!(error = %err, "reload coordinator ended abnormally");
            }
        }
    }
}

/// Start the embedded detector and reloader when `watch_enabled` is set.
///
/// Returns `None` when watching is delegated to an external supervisor. The
/// detector records its baseline before the initial state is built, so a
/// write racing the first build is always reported as a change. If the
/// first build fails the state stays empty until the next successful reload.
pub async fn spawn_in_process<B: StateBuilder>(
    cfg: &ConfigFile,
    builder: B,
) -> Result<Option<InProcessWatch<B::State>>> {
    if !cfg.watch.watch_enabled {
        info!("in-process watching disabled; changes are handled by an external supervisor");
        return Ok(None);
    }

    let target = WatchTarget::new(cfg.target_directory(), cfg.target_filename())?;
    let source: Option<Box<dyn NotificationSource>> = if cfg.watch.use_notifications {
        Some(Box::new(NotifySource::new()))
    } else {
        None
    };
    let (change_tx, change_rx) = mpsc::channel(16);
    let mut detector = ChangeDetector::new(
        target,
        Arc::new(RealFileSystem),
        source,
        cfg.detector_options(),
    )
    .spawn(change_tx);
    let baseline = detector.fingerprint_changed().await?;
    debug!(baseline = ?baseline.map(|fp| fp.short()), "detector baseline ready");

    let reloader = InProcessReloader::new(builder, cfg.settle_delay());
    let path = cfg.target.path();
    if let Err(err) = reloader.initialize(&path).await {
        warn!(
            path = %path.display(),
            error = %format!("{err:#}"),
            "initial state build failed; waiting for the next change"
        );
    }
    let state = reloader.state();

    // Changes seen during the first build wait in the channel.
    let coordinator =
        ReloadCoordinator::new(Arc::new(reloader), cfg.coordinator_options()).spawn(change_rx);

    Ok(Some(InProcessWatch {
        state,
        detector,
        coordinator,
    }))
}

/// Simple dry-run output: print the resolved configuration.
fn print_dry_run(cfg: &ConfigFile) {
    println!("binwatch dry-run");
    println!("  target = {}", cfg.target.path().display());
    println!("  watch.watch_enabled = {}", cfg.watch.watch_enabled);
    println!("  watch.debounce_window_ms = {}", cfg.watch.debounce_window_ms);
    println!("  watch.poll_interval_s = {}", cfg.watch.poll_interval_s);
    println!("  watch.use_notifications = {}", cfg.watch.use_notifications);
    println!("  reload.lease_wait_ms = {}", cfg.reload.lease_wait_ms);
    println!("  reload.settle_delay_ms = {}", cfg.reload.settle_delay_ms);
    println!("  reload.recheck_after_reload = {}", cfg.reload.recheck_after_reload);
    println!();

    match &cfg.process {
        Some(process) => {
            println!("process {}:", process.name);
            println!("  launch: {}", process.template);
            println!("  liveness: {}", process.liveness);
            println!("  grace_period: {:?}", process.grace_period);
            println!("  startup_timeout: {:?}", process.startup_timeout);
            println!("  max_start_attempts: {}", process.max_start_attempts);
            println!(
                "  backoff: {:?} doubling up to {:?}",
                process.backoff.base, process.backoff.max
            );
        }
        None => println!("no managed process"),
    }

    debug!("dry-run complete (nothing started)");
}
