// src/watch/mod.rs

//! File watching and change classification.
//!
//! This module is responsible for:
//! - Compiling the `main` / `renderer` watch sets and the ignore list.
//! - Wiring up a cross-platform filesystem watcher (`notify`).
//! - Debouncing bursts of raw events per category.
//!
//! It does **not** know about the supervisor's states; it only turns
//! filesystem changes into [`ChangeEvent`]s.

pub mod classifier;
pub mod debounce;
pub mod path_utils;
pub mod watcher;

pub use classifier::{PathClassifier, WatchRoot, WatchSet, BUILTIN_IGNORES};
pub use debounce::{ChangeEvent, Debouncer};
pub use watcher::{spawn_watcher, RawFsEvent, RawKind, WatchLoop, WatcherHandle};
