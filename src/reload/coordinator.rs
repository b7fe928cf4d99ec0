// src/reload/coordinator.rs

//! Serialising reloads.
//!
//! A single lease guards the reload path. An event that cannot get the lease
//! within `lease_wait` is dropped: the reload in flight already picks up the
//! latest artifact, so queueing would only repeat work.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info};

use crate::reload::Reloader;
use crate::watch::ChangeEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorOptions {
    /// How long an event waits for the lease before it is dropped.
    pub lease_wait: Duration,
    /// Replay the last dropped event once the current reload finishes.
    pub recheck_after_reload: bool,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            lease_wait: Duration::from_secs(1),
            recheck_after_reload: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    Reloaded,
    Failed,
    Dropped,
}

/// Proof of holding the reload lease. Released on drop, including when the
/// holder panics.
#[derive(Debug)]
pub struct ReloadLease {
    _guard: OwnedMutexGuard<()>,
}

struct Shared {
    lease: Arc<Mutex<()>>,
    reloader: Arc<dyn Reloader>,
    options: CoordinatorOptions,
    dropped: StdMutex<Option<ChangeEvent>>,
}

#[derive(Clone)]
pub struct ReloadCoordinator {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ReloadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadCoordinator")
            .field("reloader", &self.shared.reloader.name())
            .field("options", &self.shared.options)
            .field("reloading", &self.is_reloading())
            .finish()
    }
}

impl ReloadCoordinator {
    pub fn new(reloader: Arc<dyn Reloader>, options: CoordinatorOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                lease: Arc::new(Mutex::new(())),
                reloader,
                options,
                dropped: StdMutex::new(None),
            }),
        }
    }

    pub fn is_reloading(&self) -> bool {
        self.shared.lease.try_lock().is_err()
    }

    /// Wait up to `lease_wait` for the lease.
    pub async fn acquire(&self) -> Option<ReloadLease> {
        let lease = Arc::clone(&self.shared.lease);
        timeout(self.shared.options.lease_wait, lease.lock_owned())
            .await
            .ok()
            .map(|guard| ReloadLease { _guard: guard })
    }

    /// Reload for `event`, or drop it if another reload holds the lease.
    ///
    /// Never panics and never propagates reloader errors; failures are
    /// logged and reported as [`ReloadOutcome::Failed`].
    pub async fn handle_change(&self, event: ChangeEvent) -> ReloadOutcome {
        let Some(lease) = self.acquire().await else {
            info!(
                path = ?event.path,
                fingerprint = %event.fingerprint.short(),
                "reload in progress; dropping change event"
            );
            if self.shared.options.recheck_after_reload {
                *self.dropped_slot() = Some(event);
            }
            return ReloadOutcome::Dropped;
        };

        // Anything dropped before we got here predates this reload.
        self.dropped_slot().take();

        // The reload runs in its own task holding the lease, so the lease is
        // released exactly when the reload ends even if this caller goes away.
        let this = self.clone();
        let task = tokio::spawn(async move {
            let _lease = lease;
            let mut outcome = this.dispatch(&event).await;

            if this.shared.options.recheck_after_reload {
                let replay = this.dropped_slot().take();
                if let Some(latest) = replay {
                    debug!(
                        fingerprint = %latest.fingerprint.short(),
                        "replaying change event dropped during reload"
                    );
                    outcome = this.dispatch(&latest).await;
                }
            }
            outcome
        });

        match task.await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(
                    reloader = self.shared.reloader.name(),
                    error = %err,
                    "reload task panicked"
                );
                ReloadOutcome::Failed
            }
        }
    }

    /// Consume events until the channel closes, each one contending for the
    /// lease independently.
    pub fn spawn(self, mut events: mpsc::Receiver<ChangeEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let this = self.clone();
                tokio::spawn(async move {
                    this.handle_change(event).await;
                });
            }
            debug!("change event channel closed; coordinator stopping");
        })
    }

    async fn dispatch(&self, event: &ChangeEvent) -> ReloadOutcome {
        let reloader = self.shared.reloader.name();
        info!(
            reloader,
            path = ?event.path,
            fingerprint = %event.fingerprint.short(),
            "artifact changed; reloading"
        );

        match self.shared.reloader.reload(event).await {
            Ok(()) => {
                info!(reloader, fingerprint = %event.fingerprint.short(), "reload complete");
                ReloadOutcome::Reloaded
            }
            Err(err) => {
                error!(
                    reloader,
                    path = ?event.path,
                    error = %format!("{err:#}"),
                    "reload failed"
                );
                ReloadOutcome::Failed
            }
        }
    }

    fn dropped_slot(&self) -> std::sync::MutexGuard<'_, Option<ChangeEvent>> {
        self.shared.dropped.lock().unwrap_or_else(|p| p.into_inner())
    }
}
