// src/engine/handle.rs

//! Programmatic control over a running supervisor.

use tokio::sync::mpsc;

use crate::engine::SupervisorEvent;
use crate::errors::{AppmonError, Result};

/// Cloneable handle that injects requests into the supervisor loop.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    tx: mpsc::Sender<SupervisorEvent>,
}

impl SupervisorHandle {
    pub fn new(tx: mpsc::Sender<SupervisorEvent>) -> Self {
        Self { tx }
    }

    /// Restart the app from any state, including after a crash.
    pub async fn restart(&self) -> Result<()> {
        self.send(SupervisorEvent::RestartRequested).await
    }

    /// Ask every renderer surface to reload. Ignored unless the app is ready.
    pub async fn reload(&self) -> Result<()> {
        self.send(SupervisorEvent::ReloadRequested).await
    }

    /// Stop the app and end the supervisor.
    pub async fn close(&self) -> Result<()> {
        self.send(SupervisorEvent::ShutdownRequested).await
    }

    /// True once the supervisor loop has exited.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn send(&self, event: SupervisorEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| AppmonError::Other(anyhow::anyhow!("supervisor has already stopped")))
    }
}
