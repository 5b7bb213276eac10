// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`controller`] owns the single child slot: spawn, control, terminate.
//! - [`output`] turns the child's stdout/stderr into lifecycle signals.
//! - [`control`] defines the JSON messages written to the child's stdin.
//! - [`backend`] provides the `ProcessBackend` trait the runtime drives, so
//!   tests can replace the real controller with a fake.

pub mod backend;
pub mod control;
pub mod controller;
pub mod output;

pub use backend::{BackendFuture, ProcessBackend};
pub use control::ControlMessage;
pub use controller::{ChildProcessController, ChildState, LaunchSpec};
pub use output::{LifecycleSignal, OutputSignalParser};
