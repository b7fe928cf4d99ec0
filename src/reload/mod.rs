// src/reload/mod.rs

//! Reacting to confirmed artifact changes.
//!
//! The [`ReloadCoordinator`] guarantees at most one reload at a time and
//! drops events that arrive while one is in flight. What a reload actually
//! does is behind the [`Reloader`] trait:
//!
//! - [`InProcessReloader`] rebuilds shared in-process state.
//! - [`SupervisedReloader`] restarts an external managed process.
//! - [`SelfRestartReloader`] exits with the reserved restart status so a
//!   supervisor brings up a fresh instance.

pub mod coordinator;
pub mod in_process;
pub mod self_restart;
pub mod supervised;

use std::future::Future;
use std::pin::Pin;

use crate::watch::ChangeEvent;

pub use coordinator::{CoordinatorOptions, ReloadCoordinator, ReloadLease, ReloadOutcome};
pub use in_process::{InProcessReloader, SharedState, StateBuilder};
pub use self_restart::{ExitHook, SelfRestartReloader};
pub use supervised::SupervisedReloader;

/// Future returned by [`Reloader::reload`].
pub type ReloadFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

/// Trait abstracting what happens when the artifact changes.
///
/// Implementations are only ever invoked by the coordinator while it holds
/// the reload lease, so they never run concurrently with themselves.
pub trait Reloader: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &'static str;

    /// Perform one reload for `event`.
    fn reload<'a>(&'a self, event: &'a ChangeEvent) -> ReloadFuture<'a>;
}
