#![cfg(unix)]

mod common;

use std::path::Path;
use std::time::Duration;

use binwatch::errors::BinwatchError;
use binwatch::process::{
    Backoff, CommandTemplate, DesiredState, ExitNotice, Orchestrator, OrchestratorEvent,
    OrchestratorOptions, ProcessExit, ProcessSpec, ProcessState, RESTART_EXIT_CODE,
};
use binwatch::types::LivenessSpec;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tempfile::{tempdir, TempDir};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;

use common::{capture_logs, init_tracing, with_timeout, write_artifact, TestResult};

const NAME: &str = "worker";

fn fast_options() -> OrchestratorOptions {
    OrchestratorOptions {
        grace_period: Duration::from_millis(500),
        startup_timeout: Duration::from_secs(2),
        max_start_attempts: 3,
        backoff: Backoff::new(Duration::from_millis(20), Duration::from_millis(100)),
        stable_after: Duration::from_secs(60),
        kill_timeout: Duration::from_secs(5),
    }
}

/// Write `body` as `run.sh` next to a dummy artifact and describe a process
/// that runs it and is alive once it prints `ready`.
fn script_process(body: &str) -> (TempDir, ProcessSpec) {
    let dir = tempdir().expect("tempdir");
    write_artifact(dir.path(), "model.bin", b"v1");
    write_artifact(dir.path(), "run.sh", body.as_bytes());
    let spec = ProcessSpec {
        identity: NAME.to_string(),
        template: CommandTemplate::Shell("sh {dir}/run.sh".to_string()),
        directory: dir.path().to_path_buf(),
        filename: "model.bin".to_string(),
        liveness: "stdout:^ready$".parse::<LivenessSpec>().expect("liveness"),
    };
    (dir, spec)
}

fn orchestrator_with(
    spec: ProcessSpec,
    options: OrchestratorOptions,
) -> (Orchestrator, UnboundedReceiver<OrchestratorEvent>) {
    let (orchestrator, events) = Orchestrator::new(options);
    orchestrator.register(spec).expect("register");
    (orchestrator, events)
}

fn pid_alive(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// A marker file: the first run creates it, later runs see it.
fn marker(dir: &Path) -> String {
    dir.join("ran-once").display().to_string()
}

async fn next_exit(events: &mut UnboundedReceiver<OrchestratorEvent>) -> ExitNotice {
    with_timeout(async {
        loop {
            match events.recv().await {
                Some(OrchestratorEvent::Exited(notice)) => return notice,
                Some(_) => continue,
                None => panic!("orchestrator event channel closed"),
            }
        }
    })
    .await
}

const LONG_RUNNING: &str = "echo ready\nexec sleep 30\n";

#[tokio::test]
async fn start_and_stop_are_idempotent() -> TestResult {
    init_tracing();
    let (_dir, spec) = script_process(LONG_RUNNING);
    let (orchestrator, _events) = orchestrator_with(spec, fast_options());

    // Stopping something that never ran is a no-op.
    orchestrator.stop(NAME).await?;
    assert_eq!(orchestrator.state(NAME).await?, ProcessState::Stopped);

    orchestrator.start(NAME).await?;
    let first = orchestrator.snapshot(NAME).await?;
    assert_eq!(first.state, ProcessState::Running);
    assert_eq!(first.desired, DesiredState::Running);
    assert!(first.alive);

    orchestrator.start(NAME).await?;
    let second = orchestrator.snapshot(NAME).await?;
    assert_eq!(second.generation, first.generation);
    assert_eq!(second.pid, first.pid);

    orchestrator.stop(NAME).await?;
    orchestrator.stop(NAME).await?;
    let stopped = orchestrator.snapshot(NAME).await?;
    assert_eq!(stopped.state, ProcessState::Stopped);
    assert_eq!(stopped.desired, DesiredState::Stopped);
    assert_eq!(stopped.pid, None);
    assert!(!pid_alive(first.pid.ok_or("no pid")?));
    Ok(())
}

#[tokio::test]
async fn restart_replaces_the_instance() -> TestResult {
    init_tracing();
    let (_dir, spec) = script_process(LONG_RUNNING);
    let (orchestrator, _events) = orchestrator_with(spec, fast_options());

    orchestrator.start(NAME).await?;
    let before = orchestrator.snapshot(NAME).await?;

    orchestrator.restart(NAME).await?;
    let after = orchestrator.snapshot(NAME).await?;

    assert_eq!(after.state, ProcessState::Running);
    assert_eq!(after.generation, before.generation + 1);
    assert_ne!(after.pid, before.pid);
    // The old instance was confirmed dead before the new one started.
    assert!(!pid_alive(before.pid.ok_or("no pid")?));

    orchestrator.shutdown_all().await;
    Ok(())
}

#[tokio::test]
async fn unknown_identity_is_rejected() -> TestResult {
    init_tracing();
    let (orchestrator, _events) = Orchestrator::new(fast_options());
    assert!(matches!(
        orchestrator.start("nobody").await,
        Err(BinwatchError::UnknownProcess(_))
    ));

    let (_dir, spec) = script_process(LONG_RUNNING);
    orchestrator.register(spec.clone())?;
    assert!(orchestrator.register(spec).is_err());
    Ok(())
}

#[tokio::test]
async fn silent_process_exhausts_the_retry_budget() -> TestResult {
    init_tracing();
    let (_dir, spec) = script_process("exec sleep 30\n");
    let options = OrchestratorOptions {
        startup_timeout: Duration::from_millis(300),
        ..fast_options()
    };
    let (orchestrator, mut events) = orchestrator_with(spec, options);

    let err = orchestrator.start(NAME).await.expect_err("start should fail");
    assert!(
        matches!(err, BinwatchError::RetryBudgetExhausted { attempts: 3, .. }),
        "unexpected error: {err}"
    );

    let snapshot = orchestrator.snapshot(NAME).await?;
    assert_eq!(snapshot.state, ProcessState::Crashed);
    assert_eq!(snapshot.generation, 3);
    assert!(!snapshot.alive);

    let exhausted = with_timeout(async {
        loop {
            match events.recv().await {
                Some(OrchestratorEvent::RetryBudgetExhausted { identity, attempts }) => {
                    return (identity, attempts);
                }
                Some(_) => continue,
                None => panic!("orchestrator event channel closed"),
            }
        }
    })
    .await;
    assert_eq!(exhausted, (NAME.to_string(), 3));
    Ok(())
}

#[tokio::test]
async fn failed_first_start_succeeds_on_retry() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let body = format!(
        "if [ -f '{m}' ]; then echo ready; exec sleep 30; fi\ntouch '{m}'\nexit 1\n",
        m = marker(dir.path())
    );
    let (_script_dir, spec) = script_process(&body);
    let (orchestrator, _events) = orchestrator_with(spec, fast_options());

    orchestrator.start(NAME).await?;
    let snapshot = orchestrator.snapshot(NAME).await?;
    assert_eq!(snapshot.state, ProcessState::Running);
    assert_eq!(snapshot.generation, 2);

    orchestrator.shutdown_all().await;
    Ok(())
}

#[tokio::test]
async fn restart_exit_code_starts_a_fresh_instance() -> TestResult {
    let (logs, _guard) = capture_logs();
    let dir = tempdir()?;
    let body = format!(
        "if [ -f '{m}' ]; then echo ready; exec sleep 30; fi\ntouch '{m}'\necho ready\nsleep 0.2\nexit {code}\n",
        m = marker(dir.path()),
        code = RESTART_EXIT_CODE
    );
    let (_script_dir, spec) = script_process(&body);
    let (orchestrator, mut events) = orchestrator_with(spec, fast_options());

    orchestrator.start(NAME).await?;
    let notice = next_exit(&mut events).await;
    assert_eq!(notice.exit.code, Some(RESTART_EXIT_CODE));
    assert_eq!(notice.generation, 1);

    orchestrator.handle_exit(notice).await?;
    let snapshot = orchestrator.snapshot(NAME).await?;
    assert_eq!(snapshot.state, ProcessState::Running);
    assert_eq!(snapshot.generation, 2);
    assert!(snapshot.alive);

    // A requested restart is not a failure.
    assert!(logs.contains("process requested a restart"));
    assert_eq!(logs.failures(), Vec::<String>::new());

    orchestrator.shutdown_all().await;
    Ok(())
}

#[tokio::test]
async fn restart_request_during_startup_keeps_the_retry_budget() -> TestResult {
    let (logs, _guard) = capture_logs();
    let dir = tempdir()?;
    // Exits with the restart status twice before ever printing `ready`.
    let body = format!(
        "if [ -f '{m}.2' ]; then echo ready; exec sleep 30; fi\nif [ -f '{m}' ]; then touch '{m}.2'; else touch '{m}'; fi\nexit {code}\n",
        m = marker(dir.path()),
        code = RESTART_EXIT_CODE
    );
    let (_script_dir, spec) = script_process(&body);
    let options = OrchestratorOptions {
        max_start_attempts: 1,
        ..fast_options()
    };
    let (orchestrator, _events) = orchestrator_with(spec, options);

    orchestrator.start(NAME).await?;
    let snapshot = orchestrator.snapshot(NAME).await?;
    assert_eq!(snapshot.state, ProcessState::Running);
    assert_eq!(snapshot.generation, 3);
    assert_eq!(logs.failures(), Vec::<String>::new());

    orchestrator.shutdown_all().await;
    Ok(())
}

#[tokio::test]
async fn crash_after_running_is_restarted() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let body = format!(
        "if [ -f '{m}' ]; then echo ready; exec sleep 30; fi\ntouch '{m}'\necho ready\nsleep 0.2\nexit 3\n",
        m = marker(dir.path())
    );
    let (_script_dir, spec) = script_process(&body);
    let (orchestrator, mut events) = orchestrator_with(spec, fast_options());

    orchestrator.start(NAME).await?;
    let notice = next_exit(&mut events).await;
    assert_eq!(notice.exit.code, Some(3));

    orchestrator.handle_exit(notice).await?;
    let snapshot = orchestrator.snapshot(NAME).await?;
    assert_eq!(snapshot.state, ProcessState::Running);
    assert_eq!(snapshot.generation, 2);

    orchestrator.shutdown_all().await;
    Ok(())
}

#[tokio::test]
async fn clean_exit_leaves_the_process_stopped() -> TestResult {
    init_tracing();
    let (_dir, spec) = script_process("echo ready\nsleep 0.2\nexit 0\n");
    let (orchestrator, mut events) = orchestrator_with(spec, fast_options());

    orchestrator.start(NAME).await?;
    let notice = next_exit(&mut events).await;
    assert_eq!(notice.exit.code, Some(0));

    orchestrator.handle_exit(notice).await?;
    let snapshot = orchestrator.snapshot(NAME).await?;
    assert_eq!(snapshot.state, ProcessState::Stopped);
    assert_eq!(snapshot.desired, DesiredState::Stopped);
    assert_eq!(snapshot.generation, 1);
    Ok(())
}

#[tokio::test]
async fn exit_of_a_replaced_instance_is_ignored() -> TestResult {
    init_tracing();
    let (_dir, spec) = script_process(LONG_RUNNING);
    let (orchestrator, _events) = orchestrator_with(spec, fast_options());

    orchestrator.start(NAME).await?;
    orchestrator.restart(NAME).await?;
    let before = orchestrator.snapshot(NAME).await?;

    let stale = ExitNotice {
        identity: NAME.to_string(),
        generation: 1,
        exit: ProcessExit { code: Some(1) },
    };
    orchestrator.handle_exit(stale).await?;

    let after = orchestrator.snapshot(NAME).await?;
    assert_eq!(after, before);
    assert!(pid_alive(after.pid.ok_or("no pid")?));

    orchestrator.shutdown_all().await;
    Ok(())
}

#[tokio::test]
async fn process_ignoring_sigterm_is_killed_after_grace() -> TestResult {
    init_tracing();
    let (_dir, spec) = script_process("trap '' TERM\necho ready\nwhile true; do sleep 0.1; done\n");
    let options = OrchestratorOptions {
        grace_period: Duration::from_millis(300),
        ..fast_options()
    };
    let (orchestrator, _events) = orchestrator_with(spec, options);

    orchestrator.start(NAME).await?;
    let pid = orchestrator.snapshot(NAME).await?.pid.ok_or("no pid")?;

    let begin = Instant::now();
    orchestrator.stop(NAME).await?;
    assert!(begin.elapsed() >= Duration::from_millis(300));
    assert!(!pid_alive(pid));
    assert_eq!(orchestrator.state(NAME).await?, ProcessState::Stopped);
    Ok(())
}

#[tokio::test]
async fn shutdown_blocks_later_starts() -> TestResult {
    init_tracing();
    let (_dir, spec) = script_process(LONG_RUNNING);
    let (orchestrator, _events) = orchestrator_with(spec, fast_options());

    orchestrator.start(NAME).await?;
    orchestrator.shutdown_all().await;
    assert_eq!(orchestrator.state(NAME).await?, ProcessState::Stopped);

    assert!(orchestrator.start(NAME).await.is_err());
    assert_eq!(orchestrator.snapshot(NAME).await?.pid, None);
    Ok(())
}
