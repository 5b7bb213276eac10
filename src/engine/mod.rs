// src/engine/mod.rs

//! Supervision engine for appmon.
//!
//! Everything that can change what the supervisor does next arrives as a
//! [`SupervisorEvent`] on one mpsc channel:
//! - settled file changes from the watcher
//! - lifecycle signals parsed from the child's output
//! - child exits reported by the reaper
//! - restart / reload / close requests from a [`SupervisorHandle`] or Ctrl-C
//!
//! The pure state machine lives in [`core`] and [`transitions`]; the async
//! shell that executes its commands is [`runtime`].

use std::path::PathBuf;

use crate::exec::control::ControlMessage;
use crate::exec::output::LifecycleSignal;
use crate::logbus::StatusLine;
use crate::watch::debounce::ChangeEvent;

/// Generation id of a spawned child. Strictly increasing per supervisor.
pub type ChildId = u64;

/// Capacity of the supervisor event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Events flowing into the supervisor.
#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    /// A debounced change in one watch set.
    FileChanged(ChangeEvent),
    /// A marker line printed by child `child`.
    Signal {
        child: ChildId,
        signal: LifecycleSignal,
    },
    /// Child `child` exited; `code` is `None` when killed by a signal.
    ChildExited { child: ChildId, code: Option<i32> },
    /// The watcher lost its last root.
    WatcherFailed { path: PathBuf, message: String },
    RestartRequested,
    ReloadRequested,
    ShutdownRequested,
}

/// Where the supervisor is in the app's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Spawned, waiting for `main window open`.
    Launching,
    Ready,
    /// Old instance being torn down, new one not yet started.
    Restarting,
    Crashed,
    /// Crashed and quiescent until the next file change.
    AwaitingChange,
}

/// Behavioural knobs for the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SupervisorOptions {
    /// A crashed app keeps its process alive (e.g. behind an error dialog)
    /// and must be killed before a restart.
    pub resident_after_crash: bool,
}

/// Command produced by the pure core, to be executed by the async shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCommand {
    /// Write a status line to the LogBus.
    Emit(StatusLine),
    /// Stop the current child; `force` skips the graceful request.
    Terminate { force: bool },
    /// Launch a new child and report its id back via `child_started`.
    Spawn,
    SendControl(ControlMessage),
    /// Stop the supervisor with a fatal watch error.
    Fail { path: PathBuf, message: String },
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    pub keep_running: bool,
}

impl CoreStep {
    pub fn proceed(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }

    pub fn stop(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: false,
        }
    }

    pub fn idle() -> Self {
        Self::proceed(Vec::new())
    }
}

pub mod core;
pub mod handle;
pub mod runtime;
pub mod transitions;

pub use core::{SupervisorCore, SupervisorState};
pub use handle::SupervisorHandle;
pub use runtime::Runtime;
