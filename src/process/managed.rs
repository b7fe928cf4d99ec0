// src/process/managed.rs

//! One managed process: its spec, lifecycle bookkeeping, and the handle to
//! the currently running instance.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use anyhow::{anyhow, Result};
use tokio::process::ChildStdin;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::errors::BinwatchError;
use crate::process::command::{CommandTemplate, LaunchContext};
use crate::process::intent::ProcessExit;
use crate::process::liveness::attach_probe;
use crate::process::state::{DesiredState, ProcessState};
use crate::types::LivenessSpec;

/// Static description of a managed process.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub identity: String,
    pub template: CommandTemplate,
    pub directory: PathBuf,
    pub filename: String,
    pub liveness: LivenessSpec,
}

/// Sent by an instance's waiter task when the child exits, for whatever
/// reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitNotice {
    pub identity: String,
    pub generation: u64,
    pub exit: ProcessExit,
}

/// Handle to one spawned child.
///
/// The child itself is owned by a waiter task. Dropping the handle asks that
/// task to kill the child.
#[derive(Debug)]
pub struct RunningInstance {
    pid: Option<u32>,
    generation: u64,
    started_at: SystemTime,
    kill_tx: Option<oneshot::Sender<()>>,
    exited: watch::Receiver<Option<ProcessExit>>,
    _stdin: Option<ChildStdin>,
}

impl RunningInstance {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// Exit status, if the child has already exited.
    pub fn exit(&self) -> Option<ProcessExit> {
        *self.exited.borrow()
    }

    /// Wait until the child has exited (no timeout).
    pub async fn wait_exit(&mut self) -> Option<ProcessExit> {
        match self.exited.wait_for(|exit| exit.is_some()).await {
            Ok(exit) => *exit,
            // Waiter task gone without reporting; the child is gone with it.
            Err(_) => None,
        }
    }

    /// Ask politely, wait `grace`, then force-kill and wait up to
    /// `kill_timeout` for the exit to be confirmed.
    pub async fn terminate(&mut self, grace: Duration, kill_timeout: Duration) -> Result<Option<ProcessExit>> {
        if let Some(exit) = self.exit() {
            return Ok(Some(exit));
        }

        if self.pid.is_some_and(request_graceful_exit) {
            match timeout(grace, self.wait_exit()).await {
                Ok(exit) => return Ok(exit),
                Err(_) => info!(
                    pid = ?self.pid,
                    grace_ms = grace.as_millis() as u64,
                    "grace period elapsed; forcing termination"
                ),
            }
        }

        if let Some(kill) = self.kill_tx.take() {
            let _ = kill.send(());
        }
        timeout(kill_timeout, self.wait_exit())
            .await
            .map_err(|_| anyhow!("process {:?} did not exit after forced kill", self.pid))
    }
}

#[cfg(unix)]
fn request_graceful_exit(pid: u32) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) => true,
        Err(err) => {
            debug!(pid, error = %err, "SIGTERM failed");
            false
        }
    }
}

#[cfg(not(unix))]
fn request_graceful_exit(_pid: u32) -> bool {
    false
}

/// Lifecycle record for one identity. Only touched while holding the
/// registry's per-identity lock.
#[derive(Debug)]
pub struct ManagedProcess {
    spec: ProcessSpec,
    state: ProcessState,
    desired: DesiredState,
    instance: Option<RunningInstance>,
    last_start: Option<SystemTime>,
    generation: u64,
    pub(crate) failures: u32,
}

impl ManagedProcess {
    pub fn new(spec: ProcessSpec) -> Self {
        Self {
            spec,
            state: ProcessState::Stopped,
            desired: DesiredState::Stopped,
            instance: None,
            last_start: None,
            generation: 0,
            failures: 0,
        }
    }

    pub fn identity(&self) -> &str {
        &self.spec.identity
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn desired(&self) -> DesiredState {
        self.desired
    }

    pub fn set_desired(&mut self, desired: DesiredState) {
        self.desired = desired;
    }

    pub fn last_start(&self) -> Option<SystemTime> {
        self.last_start
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn instance(&self) -> Option<&RunningInstance> {
        self.instance.as_ref()
    }

    pub fn instance_mut(&mut self) -> Option<&mut RunningInstance> {
        self.instance.as_mut()
    }

    pub fn take_instance(&mut self) -> Option<RunningInstance> {
        self.instance.take()
    }

    pub fn restore_instance(&mut self, instance: RunningInstance) {
        self.instance = Some(instance);
    }

    /// Whether a child is running and has not exited yet.
    pub fn is_alive(&self) -> bool {
        self.instance.as_ref().is_some_and(|i| i.exit().is_none())
    }

    /// Move to `next`, logging the transition.
    pub fn transition(&mut self, next: ProcessState) {
        let prev = self.state;
        if prev == next {
            return;
        }
        if !prev.can_transition_to(next) {
            warn!(
                process = %self.spec.identity,
                from = %prev,
                to = %next,
                "unexpected lifecycle transition"
            );
        }
        self.state = next;
        info!(
            process = %self.spec.identity,
            from = %prev,
            to = %next,
            generation = self.generation,
            "process state changed"
        );
    }

    /// Spawn a new child and store its handle.
    ///
    /// Returns the receiver of the liveness probe. Exits are reported on
    /// `exits` tagged with the new generation.
    pub fn spawn_instance(
        &mut self,
        exits: mpsc::UnboundedSender<ExitNotice>,
    ) -> Result<oneshot::Receiver<()>, BinwatchError> {
        let ctx = LaunchContext {
            identity: &self.spec.identity,
            directory: &self.spec.directory,
            filename: &self.spec.filename,
        };
        let rendered = self.spec.template.render(&ctx);
        let mut cmd = self.spec.template.build(&ctx);

        let mut child = cmd.spawn().map_err(|source| BinwatchError::SpawnFailed {
            identity: self.spec.identity.clone(),
            source,
        })?;

        self.generation += 1;
        let generation = self.generation;
        let pid = child.id();
        let started_at = SystemTime::now();
        self.last_start = Some(started_at);

        info!(
            process = %self.spec.identity,
            pid = ?pid,
            generation,
            cmd = %rendered,
            "spawned process"
        );

        let stdin = child.stdin.take();
        let alive_rx = attach_probe(
            &self.spec.identity,
            &self.spec.liveness,
            child.stdout.take(),
            child.stderr.take(),
        );

        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let (exited_tx, exited_rx) = watch::channel(None);
        let identity = self.spec.identity.clone();

        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                // Explicit kill, or the handle was dropped.
                _ = kill_rx => {
                    if let Err(err) = child.start_kill() {
                        debug!(process = %identity, error = %err, "kill failed; process may already be gone");
                    }
                    child.wait().await
                }
            };

            let exit = match status {
                Ok(status) => ProcessExit::from_status(status),
                Err(err) => {
                    warn!(process = %identity, error = %err, "failed to wait for process");
                    ProcessExit { code: None }
                }
            };
            debug!(process = %identity, generation, %exit, "process exited");

            let _ = exited_tx.send(Some(exit));
            let _ = exits.send(ExitNotice {
                identity,
                generation,
                exit,
            });
        });

        self.instance = Some(RunningInstance {
            pid,
            generation,
            started_at,
            kill_tx: Some(kill_tx),
            exited: exited_rx,
            _stdin: stdin,
        });

        Ok(alive_rx)
    }
}
