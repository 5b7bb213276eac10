// src/exec/control.rs

//! Messages written to the child's control channel.
//!
//! The channel is the child's stdin, one JSON object per line:
//!
//! ```text
//! {"type":"refresh","path":"/abs/project/index.html"}
//! {"type":"reload"}
//! {"type":"shutdown"}
//! ```
//!
//! Interpreting them is up to the controlled application's runtime.

use std::path::PathBuf;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    /// Refresh whatever surface depends on `path`.
    Refresh { path: PathBuf },
    /// Reload every renderer surface.
    Reload,
    /// Please exit; sent ahead of a forced kill.
    Shutdown,
}

impl ControlMessage {
    /// Encode as a single newline-terminated line.
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}
