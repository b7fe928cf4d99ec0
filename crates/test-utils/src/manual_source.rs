use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use binwatch::watch::{HintSender, NotificationSource};

/// A notification source driven by the test instead of the OS.
///
/// Keep the [`ManualHints`] handle to fire notifications after handing the
/// source to a detector.
#[derive(Debug, Default)]
pub struct ManualSource {
    shared: Arc<Shared>,
    fail_subscribe: bool,
}

#[derive(Debug, Default)]
struct Shared {
    hints: Mutex<Option<HintSender>>,
    subscriptions: Mutex<Vec<PathBuf>>,
}

/// Test-side handle of a [`ManualSource`].
#[derive(Debug, Clone)]
pub struct ManualHints {
    shared: Arc<Shared>,
}

impl ManualSource {
    pub fn new() -> (Self, ManualHints) {
        let source = Self::default();
        let hints = ManualHints {
            shared: Arc::clone(&source.shared),
        };
        (source, hints)
    }

    /// A source whose `subscribe` always fails, as when the platform has no
    /// notification support.
    pub fn unavailable() -> (Self, ManualHints) {
        let (mut source, hints) = Self::new();
        source.fail_subscribe = true;
        (source, hints)
    }
}

impl NotificationSource for ManualSource {
    fn subscribe(&mut self, directory: &Path, hints: HintSender) -> anyhow::Result<()> {
        if self.fail_subscribe {
            anyhow::bail!("notifications not supported here");
        }
        *self.shared.hints.lock().unwrap() = Some(hints);
        self.shared
            .subscriptions
            .lock()
            .unwrap()
            .push(directory.to_path_buf());
        Ok(())
    }

    fn unsubscribe(&mut self) {
        self.shared.hints.lock().unwrap().take();
    }
}

impl ManualHints {
    /// Deliver a notification for `path`. Returns `false` if nobody is
    /// subscribed.
    pub fn notify(&self, path: impl Into<PathBuf>) -> bool {
        match self.shared.hints.lock().unwrap().as_ref() {
            Some(tx) => tx.send(path.into()).is_ok(),
            None => false,
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.shared.hints.lock().unwrap().is_some()
    }

    /// Directories subscribed to so far, in order.
    pub fn subscriptions(&self) -> Vec<PathBuf> {
        self.shared.subscriptions.lock().unwrap().clone()
    }
}
