// src/process/supervisor.rs

//! The standalone watch-and-restart loop.
//!
//! Wires a [`ChangeDetector`] to a [`ReloadCoordinator`] whose reloader
//! restarts the managed process, feeds exits back into the
//! [`Orchestrator`], and stops everything on SIGINT/SIGTERM.

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::ConfigFile;
use crate::errors::BinwatchError;
use crate::fs::RealFileSystem;
use crate::process::orchestrator::{Orchestrator, OrchestratorEvent};
use crate::reload::{ReloadCoordinator, SupervisedReloader};
use crate::watch::{ChangeDetector, NotificationSource, NotifySource, WatchTarget};

/// Run until a shutdown signal arrives or the process exhausts its retry
/// budget.
///
/// Every owned process is stopped before returning, whichever way the loop
/// ended. A hard kill of this process cannot run that cleanup; children are
/// spawned with `kill_on_drop` but a SIGKILL skips destructors too.
pub async fn run_supervisor(cfg: &ConfigFile) -> Result<()> {
    run_supervisor_until(cfg, shutdown_signal()).await
}

/// Like [`run_supervisor`], with a caller-provided shutdown future.
pub async fn run_supervisor_until<F>(cfg: &ConfigFile, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let spec = cfg.process_spec().ok_or_else(|| {
        BinwatchError::ConfigError("no [process] configured; nothing to supervise".to_string())
    })?;
    let identity = spec.identity.clone();

    let (orchestrator, events) = Orchestrator::new(cfg.orchestrator_options());
    orchestrator.register(spec)?;

    let result = supervise(cfg, &orchestrator, &identity, events, shutdown).await;

    info!("stopping managed processes");
    orchestrator.shutdown_all().await;

    result
}

async fn supervise<F>(
    cfg: &ConfigFile,
    orchestrator: &Orchestrator,
    identity: &str,
    mut events: mpsc::UnboundedReceiver<OrchestratorEvent>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    tokio::select! {
        res = orchestrator.start(identity) => res?,
        _ = &mut shutdown => return Ok(()),
    }

    let target = WatchTarget::new(cfg.target_directory(), cfg.target_filename())?;
    let source: Option<Box<dyn NotificationSource>> = if cfg.watch.use_notifications {
        Some(Box::new(NotifySource::new()))
    } else {
        None
    };
    let (change_tx, change_rx) = mpsc::channel(16);
    let detector = ChangeDetector::new(
        target,
        Arc::new(RealFileSystem),
        source,
        cfg.detector_options(),
    )
    .spawn(change_tx);

    let reloader = Arc::new(SupervisedReloader::new(orchestrator.clone(), identity));
    let coordinator = ReloadCoordinator::new(reloader, cfg.coordinator_options());
    let coordinator_task = coordinator.spawn(change_rx);

    info!(
        process = %identity,
        path = %cfg.target.path().display(),
        "supervising process; restarting on artifact changes"
    );

    let result = loop {
        tokio::select! {
            _ = &mut shutdown => break Ok(()),

            event = events.recv() => match event {
                Some(OrchestratorEvent::Exited(notice)) => {
                    tokio::select! {
                        res = orchestrator.handle_exit(notice) => {
                            if let Err(err) = res {
                                // Budget exhaustion arrives as its own event.
                                debug!(error = %err, "handling process exit failed");
                            }
                        }
                        _ = &mut shutdown => break Ok(()),
                    }
                }
                Some(OrchestratorEvent::RetryBudgetExhausted { identity, attempts }) => {
                    error!(process = %identity, attempts, "managed process cannot be kept running");
                    break Err(BinwatchError::RetryBudgetExhausted { identity, attempts }.into());
                }
                None => break Ok(()),
            },
        }
    };

    detector.shutdown().await;
    coordinator_task.abort();
    result
}

/// Resolve on SIGINT (Ctrl-C) or, on Unix, SIGTERM.
///
/// If the handlers cannot be installed this logs a warning and never
/// resolves.
pub async fn shutdown_signal() {
    match wait_for_signal().await {
        Ok(name) => info!(signal = name, "shutdown requested"),
        Err(err) => {
            warn!(error = %err, "failed to listen for shutdown signals");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.map(|_| "SIGINT"),
        _ = term.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|_| "ctrl-c")
}
