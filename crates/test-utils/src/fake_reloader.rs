use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use binwatch::reload::{ReloadFuture, Reloader};
use binwatch::watch::ChangeEvent;

/// A fake reloader that:
/// - records every event it was asked to reload
/// - optionally takes `delay` to "reload"
/// - tracks the highest number of reloads seen running at once
/// - can be switched to fail.
#[derive(Debug, Clone, Default)]
pub struct RecordingReloader {
    inner: Arc<State>,
}

#[derive(Debug, Default)]
struct State {
    calls: Mutex<Vec<ChangeEvent>>,
    delay: Mutex<Duration>,
    fail: AtomicBool,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl RecordingReloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        let reloader = Self::default();
        *reloader.inner.delay.lock().unwrap() = delay;
        reloader
    }

    pub fn set_failing(&self, fail: bool) {
        self.inner.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<ChangeEvent> {
        self.inner.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.inner.calls.lock().unwrap().len()
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.max_active.load(Ordering::SeqCst)
    }
}

impl Reloader for RecordingReloader {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn reload<'a>(&'a self, event: &'a ChangeEvent) -> ReloadFuture<'a> {
        let state = Arc::clone(&self.inner);
        let event = event.clone();

        Box::pin(async move {
            let now = state.active.fetch_add(1, Ordering::SeqCst) + 1;
            state.max_active.fetch_max(now, Ordering::SeqCst);

            state.calls.lock().unwrap().push(event);
            let delay = *state.delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            state.active.fetch_sub(1, Ordering::SeqCst);
            if state.fail.load(Ordering::SeqCst) {
                anyhow::bail!("reload failed on purpose");
            }
            Ok(())
        })
    }
}
