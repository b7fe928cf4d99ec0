// src/process/orchestrator.rs

//! Lifecycle management for external processes.
//!
//! The [`Orchestrator`] owns an explicit registry of [`ManagedProcess`]es
//! keyed by identity. Every operation on one identity runs under that
//! identity's async lock, so a restart can never interleave with a stop and
//! at most one instance per identity is ever alive.
//!
//! Exits are reported asynchronously by each instance's waiter task. The
//! owner of the orchestrator drains [`OrchestratorEvent`]s and feeds exits
//! back through [`Orchestrator::handle_exit`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::errors::{BinwatchError, Result};
use crate::process::backoff::Backoff;
use crate::process::intent::ExitIntent;
use crate::process::managed::{ExitNotice, ManagedProcess, ProcessSpec};
use crate::process::state::{DesiredState, ProcessState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorOptions {
    /// Time between SIGTERM and a forced kill.
    pub grace_period: Duration,
    /// How long a new instance has to pass its liveness probe.
    pub startup_timeout: Duration,
    /// Consecutive failed starts (or crashes) before giving up.
    pub max_start_attempts: u32,
    pub backoff: Backoff,
    /// An instance that ran at least this long before crashing resets the
    /// failure count.
    pub stable_after: Duration,
    /// How long to wait for the exit after a forced kill.
    pub kill_timeout: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(3),
            startup_timeout: Duration::from_secs(30),
            max_start_attempts: 3,
            backoff: Backoff::default(),
            stable_after: Duration::from_secs(60),
            kill_timeout: Duration::from_secs(10),
        }
    }
}

/// Events for the owner of an [`Orchestrator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorEvent {
    /// An instance exited; pass it to [`Orchestrator::handle_exit`].
    Exited(ExitNotice),
    /// A process exhausted its retry budget.
    RetryBudgetExhausted { identity: String, attempts: u32 },
}

/// Point-in-time view of a managed process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSnapshot {
    pub identity: String,
    pub state: ProcessState,
    pub desired: DesiredState,
    pub pid: Option<u32>,
    pub generation: u64,
    pub last_start: Option<SystemTime>,
    pub alive: bool,
}

type Entry = Arc<tokio::sync::Mutex<ManagedProcess>>;

/// How a single start attempt ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartAttempt {
    Running,
    RestartRequested,
}

/// Identity -> managed process, each behind its own async lock.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    entries: Mutex<HashMap<String, Entry>>,
}

impl ProcessRegistry {
    fn insert(&self, spec: ProcessSpec) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        if entries.contains_key(&spec.identity) {
            return Err(BinwatchError::ConfigError(format!(
                "process '{}' is already registered",
                spec.identity
            )));
        }
        entries.insert(
            spec.identity.clone(),
            Arc::new(tokio::sync::Mutex::new(ManagedProcess::new(spec))),
        );
        Ok(())
    }

    fn get(&self, identity: &str) -> Result<Entry> {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(identity)
            .cloned()
            .ok_or_else(|| BinwatchError::UnknownProcess(identity.to_string()))
    }

    fn identities(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

struct Inner {
    registry: ProcessRegistry,
    options: OrchestratorOptions,
    exits_tx: mpsc::UnboundedSender<ExitNotice>,
    events_tx: mpsc::UnboundedSender<OrchestratorEvent>,
    shutting_down: AtomicBool,
}

/// Cheap to clone; all clones share one registry.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("processes", &self.inner.registry.identities())
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an orchestrator and the receiver for its events.
    pub fn new(options: OrchestratorOptions) -> (Self, mpsc::UnboundedReceiver<OrchestratorEvent>) {
        let (exits_tx, mut exits_rx) = mpsc::unbounded_channel::<ExitNotice>();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        // Waiter tasks only know about exits; wrap them for the owner.
        let forward = events_tx.clone();
        tokio::spawn(async move {
            while let Some(notice) = exits_rx.recv().await {
                if forward.send(OrchestratorEvent::Exited(notice)).is_err() {
                    break;
                }
            }
        });

        let inner = Inner {
            registry: ProcessRegistry::default(),
            options,
            exits_tx,
            events_tx,
            shutting_down: AtomicBool::new(false),
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            events_rx,
        )
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.inner.options
    }

    /// Add a process in the `Stopped` state.
    pub fn register(&self, spec: ProcessSpec) -> Result<()> {
        debug!(process = %spec.identity, template = %spec.template, "registering process");
        self.inner.registry.insert(spec)
    }

    pub fn identities(&self) -> Vec<String> {
        self.inner.registry.identities()
    }

    pub async fn snapshot(&self, identity: &str) -> Result<ProcessSnapshot> {
        let entry = self.inner.registry.get(identity)?;
        let mp = entry.lock().await;
        Ok(ProcessSnapshot {
            identity: mp.identity().to_string(),
            state: mp.state(),
            desired: mp.desired(),
            pid: mp.instance().and_then(|i| i.pid()),
            generation: mp.generation(),
            last_start: mp.last_start(),
            alive: mp.is_alive(),
        })
    }

    pub async fn state(&self, identity: &str) -> Result<ProcessState> {
        Ok(self.snapshot(identity).await?.state)
    }

    /// Start `identity` unless it is already running.
    ///
    /// Blocks until the liveness probe passes or the retry budget is spent.
    pub async fn start(&self, identity: &str) -> Result<()> {
        let entry = self.inner.registry.get(identity)?;
        let mut mp = entry.lock().await;
        if mp.state() == ProcessState::Running && mp.is_alive() {
            debug!(process = %identity, "start requested but already running");
            return Ok(());
        }
        if mp.instance().is_some() {
            // Exited, but its notice has not been handled yet.
            self.stop_locked(&mut mp).await?;
        }
        mp.failures = 0;
        self.start_locked(&mut mp).await
    }

    /// Stop `identity`; a no-op if nothing is running. Returns after the
    /// exit is confirmed.
    pub async fn stop(&self, identity: &str) -> Result<()> {
        let entry = self.inner.registry.get(identity)?;
        let mut mp = entry.lock().await;
        self.stop_locked(&mut mp).await
    }

    /// Stop (confirmed) then start, as one exclusive operation.
    pub async fn restart(&self, identity: &str) -> Result<()> {
        let entry = self.inner.registry.get(identity)?;
        let mut mp = entry.lock().await;
        info!(process = %identity, "restarting process");
        self.stop_locked(&mut mp).await?;
        mp.failures = 0;
        self.start_locked(&mut mp).await
    }

    /// React to an instance exiting.
    ///
    /// Exits of instances that were already replaced or deliberately stopped
    /// are ignored. For the live instance the exit status decides: the
    /// reserved restart code restarts it, success leaves it stopped, and
    /// anything else counts as a crash and is retried within the budget.
    pub async fn handle_exit(&self, notice: ExitNotice) -> Result<()> {
        let entry = self.inner.registry.get(&notice.identity)?;
        let mut mp = entry.lock().await;

        let current = mp.instance().map(|i| i.generation());
        if current != Some(notice.generation) || mp.state() != ProcessState::Running {
            debug!(
                process = %notice.identity,
                generation = notice.generation,
                exit = %notice.exit,
                "ignoring exit of a replaced or stopping instance"
            );
            return Ok(());
        }

        match notice.exit.intent() {
            ExitIntent::RestartRequested => {
                info!(process = %notice.identity, "process requested a restart");
                self.stop_locked(&mut mp).await?;
                mp.failures = 0;
                self.start_locked(&mut mp).await
            }
            ExitIntent::Normal => {
                info!(process = %notice.identity, "process exited normally; leaving it stopped");
                self.stop_locked(&mut mp).await
            }
            ExitIntent::Fatal(code) => {
                let ran_for = mp
                    .instance()
                    .and_then(|i| i.started_at().elapsed().ok())
                    .unwrap_or_default();
                warn!(
                    process = %notice.identity,
                    code = ?code,
                    ran_for_ms = ran_for.as_millis() as u64,
                    "process crashed"
                );
                mp.take_instance();
                mp.transition(ProcessState::Crashed);

                if ran_for >= self.inner.options.stable_after {
                    mp.failures = 0;
                }
                mp.failures += 1;
                if mp.failures >= self.inner.options.max_start_attempts {
                    return Err(self.give_up(&mut mp));
                }
                self.start_locked(&mut mp).await
            }
        }
    }

    /// Stop every registered process. Used by cleanup paths; never fails,
    /// errors are logged per process.
    pub async fn shutdown_all(&self) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        for identity in self.inner.registry.identities() {
            if let Err(err) = self.stop(&identity).await {
                error!(process = %identity, error = %err, "failed to stop process during shutdown");
            }
        }
    }

    async fn start_locked(&self, mp: &mut ManagedProcess) -> Result<()> {
        let options = self.inner.options;
        mp.set_desired(DesiredState::Running);

        loop {
            if self.inner.shutting_down.load(Ordering::SeqCst) {
                return Err(BinwatchError::Other(anyhow::anyhow!(
                    "orchestrator is shutting down; not starting '{}'",
                    mp.identity()
                )));
            }

            if mp.failures > 0 {
                let delay = options.backoff.delay(mp.failures);
                debug!(
                    process = %mp.identity(),
                    attempt = mp.failures + 1,
                    delay_ms = delay.as_millis() as u64,
                    "backing off before next start attempt"
                );
                sleep(delay).await;
            }

            match self.attempt_start(mp).await {
                Ok(StartAttempt::Running) => return Ok(()),
                Ok(StartAttempt::RestartRequested) => {
                    // Not a failure; only the base delay applies.
                    sleep(options.backoff.delay(1)).await;
                }
                Err(err) => {
                    mp.failures += 1;
                    warn!(
                        process = %mp.identity(),
                        attempt = mp.failures,
                        max_attempts = options.max_start_attempts,
                        error = %err,
                        "start attempt failed"
                    );
                    if mp.failures >= options.max_start_attempts {
                        return Err(self.give_up(mp));
                    }
                }
            }
        }
    }

    /// One spawn + liveness wait. On failure the instance is killed and the
    /// process is left `Crashed`. An instance that exits with the restart
    /// status before becoming live leaves the process `Stopped`.
    async fn attempt_start(&self, mp: &mut ManagedProcess) -> Result<StartAttempt> {
        let options = self.inner.options;
        mp.transition(ProcessState::Starting);

        let alive_rx = match mp.spawn_instance(self.inner.exits_tx.clone()) {
            Ok(rx) => rx,
            Err(err) => {
                mp.transition(ProcessState::Crashed);
                return Err(err);
            }
        };

        let identity = mp.identity().to_string();
        let outcome = {
            let Some(instance) = mp.instance_mut() else {
                return Err(BinwatchError::Other(anyhow::anyhow!(
                    "instance for '{identity}' vanished during startup"
                )));
            };
            timeout(options.startup_timeout, async {
                tokio::select! {
                    biased;
                    alive = alive_rx => match alive {
                        Ok(()) => Ok(()),
                        // Probe gave up (stdout closed); wait for the exit to report it.
                        Err(_) => Err(instance.wait_exit().await),
                    },
                    exit = instance.wait_exit() => Err(exit),
                }
            })
            .await
        };

        let err = match outcome {
            Ok(Ok(())) => {
                mp.transition(ProcessState::Running);
                return Ok(StartAttempt::Running);
            }
            Ok(Err(Some(exit))) if exit.intent() == ExitIntent::RestartRequested => {
                info!(process = %identity, "process requested a restart during startup");
                mp.transition(ProcessState::Stopping);
                mp.take_instance();
                mp.transition(ProcessState::Stopped);
                return Ok(StartAttempt::RestartRequested);
            }
            Ok(Err(exit)) => BinwatchError::ExitedDuringStartup {
                identity: identity.clone(),
                code: exit.and_then(|e| e.code),
            },
            Err(_) => BinwatchError::StartupTimeout {
                identity: identity.clone(),
                timeout: options.startup_timeout,
            },
        };

        if let Some(mut instance) = mp.take_instance() {
            if let Err(kill_err) = instance.terminate(Duration::ZERO, options.kill_timeout).await {
                error!(process = %identity, error = %kill_err, "failed to kill instance after failed start");
            }
        }
        mp.transition(ProcessState::Crashed);
        Err(err)
    }

    async fn stop_locked(&self, mp: &mut ManagedProcess) -> Result<()> {
        let options = self.inner.options;

        let Some(mut instance) = mp.take_instance() else {
            if mp.state() != ProcessState::Stopped {
                if mp.state() != ProcessState::Crashed {
                    mp.transition(ProcessState::Stopping);
                }
                mp.transition(ProcessState::Stopped);
            }
            mp.set_desired(DesiredState::Stopped);
            return Ok(());
        };

        mp.transition(ProcessState::Stopping);
        let pid = instance.pid();
        match instance.terminate(options.grace_period, options.kill_timeout).await {
            Ok(exit) => {
                info!(
                    process = %mp.identity(),
                    pid = ?pid,
                    exit = ?exit.map(|e| e.to_string()),
                    "process stopped"
                );
                mp.transition(ProcessState::Stopped);
                mp.set_desired(DesiredState::Stopped);
                Ok(())
            }
            Err(err) => {
                // Keep the handle; a later stop can try again.
                error!(process = %mp.identity(), pid = ?pid, error = %err, "failed to stop process");
                mp.restore_instance(instance);
                Err(BinwatchError::Other(err))
            }
        }
    }

    fn give_up(&self, mp: &mut ManagedProcess) -> BinwatchError {
        let attempts = mp.failures;
        error!(
            process = %mp.identity(),
            attempts,
            "retry budget exhausted; giving up"
        );
        mp.transition(ProcessState::Crashed);
        let _ = self.inner.events_tx.send(OrchestratorEvent::RetryBudgetExhausted {
            identity: mp.identity().to_string(),
            attempts,
        });
        BinwatchError::RetryBudgetExhausted {
            identity: mp.identity().to_string(),
            attempts,
        }
    }
}
