// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::errors::{AppmonError, Result};
use crate::exec::ProcessBackend;
use crate::logbus::LogBus;

use super::core::SupervisorCore;
use super::{CoreCommand, SupervisorEvent};

/// Drives the supervisor core in response to `SupervisorEvent`s and delegates
/// process work to a `ProcessBackend`.
///
/// All semantics live in `SupervisorCore`; this shell only reads events,
/// executes the returned commands in order, and writes status lines.
pub struct Runtime<B: ProcessBackend> {
    core: SupervisorCore,
    event_rx: mpsc::Receiver<SupervisorEvent>,
    backend: B,
    logbus: LogBus,
}

impl<B: ProcessBackend> fmt::Debug for Runtime<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<B: ProcessBackend> Runtime<B> {
    pub fn new(
        core: SupervisorCore,
        event_rx: mpsc::Receiver<SupervisorEvent>,
        backend: B,
        logbus: LogBus,
    ) -> Self {
        Self {
            core,
            event_rx,
            backend,
            logbus,
        }
    }

    /// Launch the app, then process events until shutdown or a fatal error.
    ///
    /// Returns the backend so callers (and tests) can inspect it.
    pub async fn run(mut self) -> Result<B> {
        info!(root = %self.core.root().display(), "appmon supervisor started");

        let initial = self.core.start();
        if let Err(err) = self.execute_all(initial.commands).await {
            return Err(self.abort(err).await);
        }

        loop {
            let Some(event) = self.event_rx.recv().await else {
                info!("supervisor event channel closed; exiting");
                // Nothing may outlive the supervisor.
                self.backend.terminate(false).await?;
                break;
            };
            debug!(?event, "supervisor received event");

            let step = self.core.step(event);
            if let Err(err) = self.execute_all(step.commands).await {
                return Err(self.abort(err).await);
            }

            if !step.keep_running {
                info!("core requested exit; stopping supervisor");
                break;
            }
        }

        info!("supervisor exiting");
        Ok(self.backend)
    }

    async fn execute_all(&mut self, commands: Vec<CoreCommand>) -> Result<()> {
        for command in commands {
            self.execute_command(command).await?;
        }
        Ok(())
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::Emit(line) => self.logbus.emit(&line),
            CoreCommand::Terminate { force } => self.backend.terminate(force).await?,
            CoreCommand::Spawn => {
                let id = self.backend.start().await?;
                self.core.child_started(id);
            }
            CoreCommand::SendControl(message) => self.backend.send_control(message).await,
            CoreCommand::Fail { path, message } => {
                return Err(AppmonError::watch(path, message));
            }
        }
        Ok(())
    }

    /// Best-effort cleanup before surfacing a fatal error.
    async fn abort(&mut self, err: AppmonError) -> AppmonError {
        error!(error = %err, "fatal supervisor error");
        if let Err(cleanup) = self.backend.terminate(true).await {
            error!(error = %cleanup, "failed to stop app after fatal error");
        }
        err
    }
}
