// src/reload/in_process.rs

//! Hot reload of in-process state.
//!
//! The new state is built off to the side from the changed artifact and then
//! published with a single atomic swap. Readers holding the previous
//! `Arc` keep a consistent view until they drop it; new readers see the new
//! state. A failed build publishes nothing.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use arc_swap::ArcSwapOption;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::reload::{ReloadFuture, Reloader};
use crate::watch::ChangeEvent;

/// Builds the host application's state from the artifact.
///
/// `build` runs on the blocking pool, so it may do heavy synchronous work
/// such as reading and parsing a large model file.
pub trait StateBuilder: Send + Sync + 'static {
    type State: Send + Sync + 'static;

    fn build(&self, path: &Path) -> Result<Self::State>;

    /// Release resources held by a state that has been replaced. Called
    /// after the replacement is published; readers may still hold clones.
    fn dispose(&self, _old: Arc<Self::State>) {}
}

/// Atomically published shared state with a generation counter.
#[derive(Debug)]
pub struct SharedState<T> {
    current: ArcSwapOption<T>,
    generation: AtomicU64,
}

impl<T> Default for SharedState<T> {
    fn default() -> Self {
        Self {
            current: ArcSwapOption::empty(),
            generation: AtomicU64::new(0),
        }
    }
}

impl<T> SharedState<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current state, if any has been published.
    pub fn load(&self) -> Option<Arc<T>> {
        self.current.load_full()
    }

    /// Number of successful publishes so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Publish `state`, returning the one it replaced.
    pub fn publish(&self, state: T) -> Option<Arc<T>> {
        let old = self.current.swap(Some(Arc::new(state)));
        self.generation.fetch_add(1, Ordering::AcqRel);
        old
    }
}

/// [`Reloader`] that rebuilds a [`SharedState`] through a [`StateBuilder`].
pub struct InProcessReloader<B: StateBuilder> {
    builder: Arc<B>,
    state: Arc<SharedState<B::State>>,
    settle_delay: Duration,
}

impl<B: StateBuilder> std::fmt::Debug for InProcessReloader<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcessReloader")
            .field("generation", &self.state.generation())
            .field("settle_delay", &self.settle_delay)
            .finish_non_exhaustive()
    }
}

impl<B: StateBuilder> InProcessReloader<B> {
    pub fn new(builder: B, settle_delay: Duration) -> Self {
        Self {
            builder: Arc::new(builder),
            state: Arc::new(SharedState::new()),
            settle_delay,
        }
    }

    /// Handle for readers of the published state.
    pub fn state(&self) -> Arc<SharedState<B::State>> {
        Arc::clone(&self.state)
    }

    /// Build and publish the initial state, skipping the settle delay.
    pub async fn initialize(&self, path: &Path) -> Result<u64> {
        self.rebuild(path).await
    }

    /// Wait for writers to settle, then rebuild from `path`.
    ///
    /// Returns the generation of the published state.
    pub async fn reload_path(&self, path: &Path) -> Result<u64> {
        if !self.settle_delay.is_zero() {
            debug!(settle_ms = self.settle_delay.as_millis() as u64, "waiting for artifact to settle");
            sleep(self.settle_delay).await;
        }
        self.rebuild(path).await
    }

    async fn rebuild(&self, path: &Path) -> Result<u64> {
        let builder = Arc::clone(&self.builder);
        let owned = path.to_path_buf();
        let built = tokio::task::spawn_blocking(move || builder.build(&owned))
            .await
            .context("state builder panicked")?
            .with_context(|| format!("building state from {}", path.display()));

        let new_state = match built {
            Ok(state) => state,
            Err(err) => {
                warn!(
                    path = %path.display(),
                    generation = self.state.generation(),
                    "rebuild failed; keeping previous state"
                );
                return Err(err);
            }
        };

        let old = self.state.publish(new_state);
        let generation = self.state.generation();
        info!(path = %path.display(), generation, "published rebuilt state");

        if let Some(old) = old {
            let builder = Arc::clone(&self.builder);
            if let Err(err) = tokio::task::spawn_blocking(move || builder.dispose(old)).await {
                warn!(error = %err, "disposing previous state panicked");
            }
        }
        Ok(generation)
    }
}

impl<B: StateBuilder> Reloader for InProcessReloader<B> {
    fn name(&self) -> &'static str {
        "in-process"
    }

    fn reload<'a>(&'a self, event: &'a ChangeEvent) -> ReloadFuture<'a> {
        Box::pin(async move { self.reload_path(&event.path).await.map(|_| ()) })
    }
}
