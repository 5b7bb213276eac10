// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::types::{default_resident_after_crash, Category, Verbosity};

/// Configuration exactly as read from TOML, before validation.
///
/// ```toml
/// [app]
/// command = "electron"
/// args = ["main.js"]
///
/// [timing]
/// debounce = "300ms"
/// terminate_timeout = "3s"
///
/// [[watch]]
/// category = "main"
/// paths = ["main.js"]
///
/// [[watch]]
/// category = "renderer"
/// paths = ["renderer.js", "index.html"]
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    /// How to launch the controlled application. May be omitted when the
    /// command is given on the command line instead.
    #[serde(default)]
    pub app: AppSection,

    #[serde(default)]
    pub timing: TimingSection,

    #[serde(default)]
    pub log: LogSection,

    /// Patterns shared by every watch entry (currently only `exclude`).
    #[serde(default)]
    pub default: DefaultSection,

    /// `[[watch]]` entries, each assigning paths to one category.
    #[serde(default)]
    pub watch: Vec<WatchEntry>,
}

impl RawConfigFile {
    /// Replace the launch command with one given on the command line
    /// (`appmon -- electron main.js`). An empty override is ignored.
    pub fn with_command_override(mut self, command: &[String]) -> Self {
        if let Some((program, args)) = command.split_first() {
            self.app.command = program.clone();
            self.app.args = args.to_vec();
        }
        self
    }
}

/// `[app]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    /// Program to execute (looked up on `PATH` if not a path).
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables, layered over the supervisor's own.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Working directory, relative to the project root.
    #[serde(default)]
    pub cwd: Option<String>,

    /// Whether a crashed child stays alive (e.g. behind an error dialog)
    /// and must be killed before restarting. Defaults per platform.
    #[serde(default)]
    pub resident_after_crash: Option<bool>,
}

/// `[timing]` section. Durations use the `"300ms"` / `"3s"` notation.
#[derive(Debug, Clone, Deserialize)]
pub struct TimingSection {
    #[serde(default = "default_debounce")]
    pub debounce: String,

    #[serde(default = "default_terminate_timeout")]
    pub terminate_timeout: String,
}

fn default_debounce() -> String {
    "300ms".to_string()
}

fn default_terminate_timeout() -> String {
    "3s".to_string()
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            debounce: default_debounce(),
            terminate_timeout: default_terminate_timeout(),
        }
    }
}

/// `[log]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LogSection {
    /// `"quiet"`, `"info"` or `"verbose"`.
    #[serde(default)]
    pub level: Option<Verbosity>,
}

/// `[default]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DefaultSection {
    /// Extra ignore globs, appended to the built-in ignore list.
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// One `[[watch]]` entry.
///
/// `category` is optional at the serde level so that a missing category is
/// reported as a configuration error naming the entry, instead of a bare
/// TOML error.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct WatchEntry {
    #[serde(default)]
    pub category: Option<Category>,

    #[serde(default)]
    pub paths: Vec<String>,
}

/// Parsed `[timing]` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub debounce: Duration,
    pub terminate_timeout: Duration,
}

/// Validated configuration. Built through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub app: AppSection,
    pub timing: Timing,
    pub log: LogSection,
    pub default: DefaultSection,
    pub watch: Vec<WatchEntry>,
}

impl ConfigFile {
    /// Assemble a `ConfigFile` from parts that have already been validated.
    pub(crate) fn new_unchecked(raw: RawConfigFile, timing: Timing) -> Self {
        Self {
            app: raw.app,
            timing,
            log: raw.log,
            default: raw.default,
            watch: raw.watch,
        }
    }

    /// Effective crash-residency capability for the controlled app.
    pub fn resident_after_crash(&self) -> bool {
        self.app
            .resident_after_crash
            .unwrap_or_else(default_resident_after_crash)
    }

    /// All patterns declared for `category`, in declaration order.
    pub fn paths_for(&self, category: Category) -> Vec<String> {
        self.watch
            .iter()
            .filter(|w| w.category == Some(category))
            .flat_map(|w| w.paths.iter().cloned())
            .collect()
    }
}
