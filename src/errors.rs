// src/errors.rs

//! Crate-wide error type, result alias and exit codes.
//!
//! Only conditions that make forward progress impossible end up here.
//! Recoverable conditions (a single watch root failing, a crashed child) are
//! absorbed where they are detected and only show up as log lines.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppmonError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Watch error on {path:?}: {message}")]
    WatchError { path: PathBuf, message: String },

    #[error("Failed to spawn `{command}`: {source}")]
    SpawnError {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Child process {pid:?} still alive {timeout:?} after forced kill")]
    TerminationTimeout { pid: Option<u32>, timeout: Duration },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppmonError {
    pub fn config(msg: impl Into<String>) -> Self {
        AppmonError::ConfigError(msg.into())
    }

    pub fn watch(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        AppmonError::WatchError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Process exit code used by `main` when this error ends the supervisor.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppmonError::ConfigError(_) | AppmonError::TomlError(_) => 2,
            AppmonError::SpawnError { .. } => 3,
            AppmonError::WatchError { .. } => 4,
            AppmonError::TerminationTimeout { .. } => 5,
            AppmonError::IoError(_) | AppmonError::Other(_) => 1,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, AppmonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_map_to_distinct_nonzero_codes() {
        let spawn = AppmonError::SpawnError {
            command: "nope".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        let timeout = AppmonError::TerminationTimeout {
            pid: Some(42),
            timeout: Duration::from_secs(3),
        };

        assert_eq!(AppmonError::config("bad").exit_code(), 2);
        assert_eq!(spawn.exit_code(), 3);
        assert_eq!(AppmonError::watch("/tmp", "gone").exit_code(), 4);
        assert_eq!(timeout.exit_code(), 5);
        assert_eq!(AppmonError::Other(anyhow::anyhow!("x")).exit_code(), 1);
    }
}
