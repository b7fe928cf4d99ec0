// src/reload/supervised.rs

use crate::process::Orchestrator;
use crate::reload::{ReloadFuture, Reloader};
use crate::watch::ChangeEvent;

/// Restarts one managed process on every confirmed change.
#[derive(Debug, Clone)]
pub struct SupervisedReloader {
    orchestrator: Orchestrator,
    identity: String,
}

impl SupervisedReloader {
    pub fn new(orchestrator: Orchestrator, identity: impl Into<String>) -> Self {
        Self {
            orchestrator,
            identity: identity.into(),
        }
    }
}

impl Reloader for SupervisedReloader {
    fn name(&self) -> &'static str {
        "supervised-restart"
    }

    fn reload<'a>(&'a self, _event: &'a ChangeEvent) -> ReloadFuture<'a> {
        Box::pin(async move {
            self.orchestrator.restart(&self.identity).await?;
            Ok(())
        })
    }
}
