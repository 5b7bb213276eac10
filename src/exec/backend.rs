// src/exec/backend.rs

//! Pluggable process backend.
//!
//! The supervisor runtime talks to a [`ProcessBackend`] instead of the
//! controller directly. Production uses [`ChildProcessController`]; tests
//! swap in a fake that records calls and never spawns a process.

use std::future::Future;
use std::pin::Pin;

use crate::engine::ChildId;
use crate::errors::Result;
use crate::exec::control::ControlMessage;
use crate::exec::controller::ChildProcessController;

pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What the supervisor needs from whatever runs the app.
pub trait ProcessBackend: Send {
    /// Launch a fresh instance and return its generation id.
    fn start(&mut self) -> BackendFuture<'_, Result<ChildId>>;

    /// Best-effort control message to the current instance.
    fn send_control(&mut self, message: ControlMessage) -> BackendFuture<'_, ()>;

    /// Stop the current instance; `force` skips the graceful request.
    fn terminate(&mut self, force: bool) -> BackendFuture<'_, Result<()>>;
}

impl ProcessBackend for ChildProcessController {
    fn start(&mut self) -> BackendFuture<'_, Result<ChildId>> {
        Box::pin(ChildProcessController::start(self))
    }

    fn send_control(&mut self, message: ControlMessage) -> BackendFuture<'_, ()> {
        Box::pin(ChildProcessController::send_control(self, message))
    }

    fn terminate(&mut self, force: bool) -> BackendFuture<'_, Result<()>> {
        Box::pin(ChildProcessController::terminate(self, force))
    }
}
