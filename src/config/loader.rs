// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and run structural validation.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks the launch command, durations, glob syntax and that no pattern
///   is assigned to both categories.
///
/// Whether the declared paths exist is checked when the classifier is built
/// against the project root.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Like [`load_and_validate`], but with the launch command replaced by
/// `command` (when non-empty) before validation.
pub fn load_with_command_override(path: impl AsRef<Path>, command: &[String]) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?.with_command_override(command);
    ConfigFile::try_from(raw_config)
}

/// Figure out the project root for a config path.
///
/// - If the config path has a non-empty parent (e.g. "app/Appmon.toml"),
///   we use that directory.
/// - If it's just a bare filename like "Appmon.toml" (parent = ""),
///   we fall back to the current working directory "."
pub fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}
