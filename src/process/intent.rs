// src/process/intent.rs

//! The restart contract between a managed process and its supervisor.
//!
//! A process that watches its own artifact cannot restart itself. It exits
//! with [`RESTART_EXIT_CODE`] instead and the supervisor starts a fresh
//! instance. Every other non-zero status is a genuine failure.

use std::fmt;

/// Reserved "please restart me" status (`EX_TEMPFAIL` from sysexits.h).
///
/// Chosen outside the shell's 126..=165 range and away from the generic
/// 1 and 2 failure codes.
pub const RESTART_EXIT_CODE: i32 = 75;

/// How a process exited, as reported by its waiter task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// `None` when the process was killed by a signal or could not be waited on.
    pub code: Option<i32>,
}

impl ProcessExit {
    pub fn from_status(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }

    pub fn intent(&self) -> ExitIntent {
        ExitIntent::from_code(self.code)
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => f.write_str("terminated by signal"),
        }
    }
}

/// Tri-state reading of an exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitIntent {
    Normal,
    RestartRequested,
    Fatal(Option<i32>),
}

impl ExitIntent {
    pub fn from_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => ExitIntent::Normal,
            Some(RESTART_EXIT_CODE) => ExitIntent::RestartRequested,
            other => ExitIntent::Fatal(other),
        }
    }

    /// The status a process should exit with to express this intent.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExitIntent::Normal => 0,
            ExitIntent::RestartRequested => RESTART_EXIT_CODE,
            ExitIntent::Fatal(Some(code)) if *code != 0 && *code != RESTART_EXIT_CODE => *code,
            ExitIntent::Fatal(_) => 1,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ExitIntent::Fatal(_))
    }
}

/// Exit the current process asking the supervisor for a fresh instance.
pub fn request_restart() -> ! {
    std::process::exit(ExitIntent::RestartRequested.exit_code())
}
