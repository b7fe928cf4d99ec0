// src/watch/detector.rs

//! The change detector: notifications + polling in, confirmed
//! [`ChangeEvent`]s out.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::fs::FileSystem;
use crate::watch::debounce::Debouncer;
use crate::watch::fingerprint::Fingerprint;
use crate::watch::source::{HintSender, NotificationSource};
use crate::watch::target::{ChangeEvent, WatchTarget};

/// Polling interval used when notifications turn out to be unavailable and
/// polling was disabled in the configuration.
pub const FALLBACK_POLL_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorOptions {
    pub debounce: Duration,
    /// `None` disables the polling path (only allowed with notifications).
    pub poll_interval: Option<Duration>,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            poll_interval: Some(Duration::from_secs(3)),
        }
    }
}

/// What made the detector look at the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckReason {
    Debounced { notifications: u32 },
    Poll,
}

enum Control {
    Retarget(PathBuf),
    Shutdown,
}

/// Owns one [`WatchTarget`] and is its only writer.
pub struct ChangeDetector {
    target: WatchTarget,
    fs: Arc<dyn FileSystem>,
    source: Option<Box<dyn NotificationSource>>,
    options: DetectorOptions,
    fingerprint_tx: watch::Sender<Option<Fingerprint>>,
}

impl std::fmt::Debug for ChangeDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeDetector")
            .field("target", &self.target)
            .field("options", &self.options)
            .field("notifications", &self.source.is_some())
            .finish_non_exhaustive()
    }
}

/// Handle to a running detector task.
///
/// Dropping the handle without calling [`shutdown`](Self::shutdown) aborts
/// the task.
#[derive(Debug)]
pub struct DetectorHandle {
    control: mpsc::UnboundedSender<Control>,
    fingerprint: watch::Receiver<Option<Fingerprint>>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Control {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Control::Retarget(dir) => f.debug_tuple("Retarget").field(dir).finish(),
            Control::Shutdown => f.write_str("Shutdown"),
        }
    }
}

impl DetectorHandle {
    /// Fingerprint currently stored for the target (`None` before baseline).
    pub fn fingerprint(&self) -> Option<Fingerprint> {
        *self.fingerprint.borrow()
    }

    /// Wait until the stored fingerprint is set or changes.
    pub async fn fingerprint_changed(&mut self) -> Result<Option<Fingerprint>> {
        self.fingerprint
            .changed()
            .await
            .map_err(|_| anyhow!("detector stopped"))?;
        Ok(*self.fingerprint.borrow_and_update())
    }

    /// Tear down the subscription, move to `directory`, and start over from a
    /// fresh baseline.
    pub fn retarget(&self, directory: impl Into<PathBuf>) -> Result<()> {
        self.control
            .send(Control::Retarget(directory.into()))
            .map_err(|_| anyhow!("detector stopped"))
    }

    /// Stop the detector and wait for its task to finish.
    pub async fn shutdown(mut self) {
        let _ = self.control.send(Control::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                if !err.is_cancelled() {
                    warn!(error = %err, "detector task ended abnormally");
                }
            }
        }
    }
}

impl Drop for DetectorHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl ChangeDetector {
    pub fn new(
        target: WatchTarget,
        fs: Arc<dyn FileSystem>,
        source: Option<Box<dyn NotificationSource>>,
        options: DetectorOptions,
    ) -> Self {
        let (fingerprint_tx, _) = watch::channel(None);
        Self {
            target,
            fs,
            source,
            options,
            fingerprint_tx,
        }
    }

    /// Spawn the detection loop; confirmed changes are sent on `events`.
    pub fn spawn(self, events: mpsc::Sender<ChangeEvent>) -> DetectorHandle {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let fingerprint = self.fingerprint_tx.subscribe();
        let task = tokio::spawn(self.run(events, control_rx));

        DetectorHandle {
            control: control_tx,
            fingerprint,
            task: Some(task),
        }
    }

    async fn run(
        mut self,
        events: mpsc::Sender<ChangeEvent>,
        mut control_rx: mpsc::UnboundedReceiver<Control>,
    ) {
        let (hint_tx, mut hint_rx) = mpsc::unbounded_channel::<PathBuf>();
        let mut debouncer = Debouncer::new(self.options.debounce);

        self.setup(&hint_tx).await;
        let mut poll = self.poll_timer();

        info!(
            path = ?self.target.path(),
            debounce_ms = self.options.debounce.as_millis() as u64,
            poll_interval_ms = self.options.poll_interval.map(|d| d.as_millis() as u64),
            notifications = self.source.is_some(),
            "change detector started"
        );

        loop {
            let deadline = debouncer.deadline();

            tokio::select! {
                Some(path) = hint_rx.recv() => {
                    if self.target.accepts(&path) {
                        trace!(?path, "notification; (re)starting debounce window");
                        debouncer.record(Instant::now());
                    } else {
                        trace!(?path, "notification for unrelated file; discarded");
                    }
                }

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some(notifications) = debouncer.take_ready(Instant::now()) {
                        if !self.check(&events, CheckReason::Debounced { notifications }).await {
                            break;
                        }
                    }
                }

                _ = next_tick(&mut poll) => {
                    // A pending debounce will look at the file shortly.
                    if !debouncer.has_pending() && !self.check(&events, CheckReason::Poll).await {
                        break;
                    }
                }

                cmd = control_rx.recv() => match cmd {
                    Some(Control::Retarget(directory)) => {
                        info!(from = ?self.target.directory(), to = ?directory, "retargeting change detector");
                        if let Some(source) = self.source.as_mut() {
                            source.unsubscribe();
                        }
                        debouncer.clear();
                        while hint_rx.try_recv().is_ok() {}
                        self.target.retarget(directory);
                        self.setup(&hint_tx).await;
                        poll = self.poll_timer();
                    }
                    Some(Control::Shutdown) | None => break,
                },
            }
        }

        if let Some(source) = self.source.as_mut() {
            source.unsubscribe();
        }
        debug!(path = ?self.target.path(), "change detector stopped");
    }

    /// Baseline the target and subscribe to notifications for its directory.
    async fn setup(&mut self, hint_tx: &HintSender) {
        let fs = Arc::clone(&self.fs);
        let mut target = self.target.clone();
        match tokio::task::spawn_blocking(move || {
            target.baseline(&*fs);
            target
        })
        .await
        {
            Ok(target) => self.target = target,
            Err(err) => warn!(error = %err, "baseline fingerprint task failed"),
        }
        let _ = self.fingerprint_tx.send(self.target.fingerprint());

        if let Some(source) = self.source.as_mut() {
            if let Err(err) = source.subscribe(self.target.directory(), hint_tx.clone()) {
                warn!(
                    directory = ?self.target.directory(),
                    error = %format!("{err:#}"),
                    "file notifications unavailable; falling back to polling"
                );
                self.source = None;
                if self.options.poll_interval.is_none() {
                    self.options.poll_interval = Some(FALLBACK_POLL_INTERVAL);
                }
            }
        }
    }

    fn poll_timer(&self) -> Option<Interval> {
        self.options.poll_interval.map(|every| {
            let mut timer = interval_at(Instant::now() + every, every);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            timer
        })
    }

    /// Run the shared compare-and-emit step. Returns `false` once nobody is
    /// listening for events any more.
    async fn check(&mut self, events: &mpsc::Sender<ChangeEvent>, reason: CheckReason) -> bool {
        trace!(?reason, path = ?self.target.path(), "checking artifact fingerprint");

        let fs = Arc::clone(&self.fs);
        let mut target = self.target.clone();
        let (target, event) = match tokio::task::spawn_blocking(move || {
            let event = target.observe(&*fs);
            (target, event)
        })
        .await
        {
            Ok(result) => result,
            Err(err) => {
                warn!(error = %err, "fingerprint task failed; retrying next tick");
                return true;
            }
        };
        self.target = target;

        let Some(event) = event else {
            return true;
        };

        debug!(
            ?reason,
            path = ?event.path,
            fingerprint = %event.fingerprint.short(),
            "emitting change event"
        );
        let _ = self.fingerprint_tx.send(Some(event.fingerprint));

        if events.send(event).await.is_err() {
            info!("change event receiver closed; stopping detector");
            return false;
        }
        true
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
