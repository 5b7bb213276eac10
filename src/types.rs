// src/types.rs

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

/// Which half of the controlled application a watched file belongs to.
///
/// - `Main`: a change requires a full restart of the app process.
/// - `Renderer`: a change only requires a refresh of the affected surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Main,
    Renderer,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Main, Category::Renderer];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Main => "main",
            Category::Renderer => "renderer",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "main" => Ok(Category::Main),
            "renderer" => Ok(Category::Renderer),
            other => Err(format!(
                "invalid category: {other} (expected \"main\" or \"renderer\")"
            )),
        }
    }
}

/// Verbosity of the user-facing status lines written by the LogBus.
///
/// Ordered: `Quiet < Info < Verbose`. A line is shown when its own level is
/// at or below the configured verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Quiet,
    #[default]
    Info,
    Verbose,
}

impl FromStr for Verbosity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "quiet" => Ok(Verbosity::Quiet),
            "info" => Ok(Verbosity::Info),
            "verbose" => Ok(Verbosity::Verbose),
            other => Err(format!(
                "invalid log level: {other} (expected \"quiet\", \"info\" or \"verbose\")"
            )),
        }
    }
}

/// Whether a crashed child stays resident (e.g. blocked on a native error
/// dialog) on this platform.
pub fn default_resident_after_crash() -> bool {
    cfg!(windows)
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}
