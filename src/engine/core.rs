// src/engine/core.rs

//! Pure supervisor state machine.
//!
//! [`SupervisorCore`] consumes [`SupervisorEvent`]s and returns a
//! [`CoreStep`] describing what the async shell should do: emit status
//! lines, terminate or spawn the child, send control messages, or stop.
//!
//! It owns no channels or processes, so every transition can be unit tested
//! synchronously.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::debug;

use crate::engine::transitions;
use crate::engine::{ChildId, CoreCommand, CoreStep, Phase, SupervisorEvent, SupervisorOptions};

/// Mutable state of the supervisor. Only the core touches it.
#[derive(Debug, Clone)]
pub struct SupervisorState {
    pub phase: Phase,
    /// A main change arrived while launching.
    pub pending_restart: bool,
    /// Renderer changes that arrived while launching, oldest first.
    pub pending_refresh: Vec<PathBuf>,
    /// When the app last reached `Ready`.
    pub last_known_good: Option<Instant>,
    /// Generation of the current child, if one has been started.
    pub child: Option<ChildId>,
    /// The current child has not been seen to exit.
    pub child_alive: bool,
}

impl SupervisorState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Launching,
            pending_restart: false,
            pending_refresh: Vec::new(),
            last_known_good: None,
            child: None,
            child_alive: false,
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending_restart || !self.pending_refresh.is_empty()
    }

    pub(crate) fn clear_pending(&mut self) {
        self.pending_restart = false;
        self.pending_refresh.clear();
    }
}

impl Default for SupervisorState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct SupervisorCore {
    state: SupervisorState,
    options: SupervisorOptions,
    root: PathBuf,
}

impl SupervisorCore {
    /// `root` is the project root; status lines show paths relative to it.
    pub fn new(options: SupervisorOptions, root: impl Into<PathBuf>) -> Self {
        Self {
            state: SupervisorState::new(),
            options,
            root: root.into(),
        }
    }

    pub fn state(&self) -> &SupervisorState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn options(&self) -> SupervisorOptions {
        self.options
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Commands for the initial launch.
    pub fn start(&mut self) -> CoreStep {
        self.state.phase = Phase::Launching;
        CoreStep::proceed(vec![CoreCommand::Spawn])
    }

    /// Record that a `Spawn` command produced child `id`.
    pub fn child_started(&mut self, id: ChildId) {
        debug!(child = id, "child started; launching");
        self.state.child = Some(id);
        self.state.child_alive = true;
        self.state.phase = Phase::Launching;
    }

    /// Handle a single event, returning the commands for the IO shell.
    pub fn step(&mut self, event: SupervisorEvent) -> CoreStep {
        let state = &mut self.state;
        let options = &self.options;
        let root = self.root.as_path();

        match event {
            SupervisorEvent::FileChanged(change) => {
                transitions::handle_file_change(state, options, root, change)
            }
            SupervisorEvent::Signal { child, signal } => {
                transitions::handle_signal(state, options, child, signal)
            }
            SupervisorEvent::ChildExited { child, code } => {
                transitions::handle_child_exited(state, child, code)
            }
            SupervisorEvent::WatcherFailed { path, message } => {
                transitions::handle_watcher_failed(state, options, path, message)
            }
            SupervisorEvent::RestartRequested => transitions::handle_restart_request(state, options),
            SupervisorEvent::ReloadRequested => transitions::handle_reload_request(state),
            SupervisorEvent::ShutdownRequested => transitions::handle_shutdown(state, options),
        }
    }
}
