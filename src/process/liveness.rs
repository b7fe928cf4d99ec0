// src/process/liveness.rs

//! Startup liveness probes and output draining.
//!
//! Whatever the probe, stdout and stderr are always consumed so the child
//! never blocks on a full pipe; lines are logged at debug.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::sync::oneshot;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::types::LivenessSpec;

/// Attach the probe for `spec` to a freshly spawned process.
///
/// The returned receiver resolves once the process is considered alive. If
/// the probe can never succeed (e.g. stdout closed before a match) the
/// sender is dropped and the receiver yields an error.
pub fn attach_probe(
    identity: &str,
    spec: &LivenessSpec,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
) -> oneshot::Receiver<()> {
    let (alive_tx, alive_rx) = oneshot::channel();

    if let Some(stderr) = stderr {
        let identity = identity.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(process = %identity, "stderr: {}", line);
            }
        });
    }

    match spec {
        LivenessSpec::Immediate => {
            let _ = alive_tx.send(());
            drain_stdout(identity, stdout, None, None);
        }
        LivenessSpec::Delay(delay) => {
            let delay = *delay;
            tokio::spawn(async move {
                sleep(delay).await;
                let _ = alive_tx.send(());
            });
            drain_stdout(identity, stdout, None, None);
        }
        LivenessSpec::StdoutMatch(re) => {
            if stdout.is_none() {
                warn!(process = %identity, "stdout liveness probe configured but no stdout pipe available");
            }
            drain_stdout(identity, stdout, Some(re.clone()), Some(alive_tx));
        }
    }

    alive_rx
}

fn drain_stdout(
    identity: &str,
    stdout: Option<ChildStdout>,
    pattern: Option<regex::Regex>,
    mut alive_tx: Option<oneshot::Sender<()>>,
) {
    let Some(stdout) = stdout else {
        return;
    };
    let identity = identity.to_string();

    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(process = %identity, "stdout: {}", line);

            if let (Some(re), Some(_)) = (&pattern, &alive_tx) {
                if re.is_match(&line) {
                    debug!(process = %identity, "stdout matched liveness pattern");
                    if let Some(tx) = alive_tx.take() {
                        let _ = tx.send(());
                    }
                }
            }
        }
    });
}
