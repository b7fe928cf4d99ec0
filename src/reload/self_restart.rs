// src/reload/self_restart.rs

//! Restart-by-exit for processes that run under a supervisor.

use std::sync::Arc;

use tracing::info;

use crate::process::intent::ExitIntent;
use crate::reload::{ReloadFuture, Reloader};
use crate::watch::ChangeEvent;

/// Called with the exit intent; the default implementation exits the process.
pub type ExitHook = Arc<dyn Fn(ExitIntent) + Send + Sync>;

/// Exits the current process with the reserved restart status when the
/// artifact changes.
pub struct SelfRestartReloader {
    exit: ExitHook,
}

impl std::fmt::Debug for SelfRestartReloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelfRestartReloader").finish_non_exhaustive()
    }
}

impl Default for SelfRestartReloader {
    fn default() -> Self {
        Self::new()
    }
}

impl SelfRestartReloader {
    pub fn new() -> Self {
        Self::with_exit_hook(Arc::new(|intent: ExitIntent| {
            std::process::exit(intent.exit_code())
        }))
    }

    pub fn with_exit_hook(exit: ExitHook) -> Self {
        Self { exit }
    }
}

impl Reloader for SelfRestartReloader {
    fn name(&self) -> &'static str {
        "self-restart"
    }

    fn reload<'a>(&'a self, event: &'a ChangeEvent) -> ReloadFuture<'a> {
        Box::pin(async move {
            info!(
                path = ?event.path,
                fingerprint = %event.fingerprint.short(),
                "artifact changed; exiting so the supervisor restarts us"
            );
            (self.exit)(ExitIntent::RestartRequested);
            Ok(())
        })
    }
}
