// src/process/mod.rs

//! Supervision of external processes that consume the watched artifact.
//!
//! - `command`: launch templates (`sh -c "exec ..."`, container form).
//! - `liveness`: startup probes and stdout/stderr draining.
//! - `managed`: one process record and its running instance.
//! - `orchestrator`: the registry and start/stop/restart lifecycle.
//! - `supervisor`: the standalone watch-and-restart loop used by the binary.

pub mod backoff;
pub mod command;
pub mod intent;
pub mod liveness;
pub mod managed;
pub mod orchestrator;
pub mod state;
pub mod supervisor;

pub use backoff::Backoff;
pub use command::{find_executable, shell_quote, CommandTemplate, LaunchContext};
pub use intent::{request_restart, ExitIntent, ProcessExit, RESTART_EXIT_CODE};
pub use managed::{ExitNotice, ManagedProcess, ProcessSpec, RunningInstance};
pub use orchestrator::{
    Orchestrator, OrchestratorEvent, OrchestratorOptions, ProcessRegistry, ProcessSnapshot,
};
pub use state::{DesiredState, ProcessState};
pub use supervisor::{run_supervisor, run_supervisor_until, shutdown_signal};
