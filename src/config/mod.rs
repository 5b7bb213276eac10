// src/config/mod.rs

//! Configuration loading and validation for appmon.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate structural invariants like category assignment (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{
    config_root_dir, load_and_validate, load_from_path,
    load_with_command_override,
};
pub use model::{
    AppSection, ConfigFile, DefaultSection, LogSection, RawConfigFile, Timing, TimingSection,
    WatchEntry,
};
pub use validate::validate_config;
