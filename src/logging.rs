// src/logging.rs

//! Logging setup for `appmon` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the diagnostic log level:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `APPMON_LOG` environment variable (e.g. "info", "debug")
//! 3. default to `warn`
//!
//! Diagnostics go to STDERR; stdout carries the status lines and the app's
//! own output. Status line verbosity is resolved separately by
//! [`resolve_verbosity`].

use anyhow::Result;
use tracing_subscriber::fmt;

use crate::cli::LogLevel;
use crate::types::Verbosity;

/// Environment variable for the diagnostic level.
pub const LOG_ENV: &str = "APPMON_LOG";

/// Environment variable for the status line verbosity.
pub const VERBOSITY_ENV: &str = "APPMON_LOGLEVEL";

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let level = match cli_level {
        Some(lvl) => level_from_log_level(lvl),
        None => std::env::var(LOG_ENV)
            .ok()
            .and_then(|s| parse_level_str(&s))
            .unwrap_or(tracing::Level::WARN),
    };

    fmt()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {err}"))?;

    Ok(())
}

/// Status line verbosity: flag, then `APPMON_LOGLEVEL`, then config, then
/// `info`. An unparsable environment value is ignored with a warning.
pub fn resolve_verbosity(cli: Option<Verbosity>, config: Option<Verbosity>) -> Verbosity {
    let from_env = || {
        let raw = std::env::var(VERBOSITY_ENV).ok()?;
        match raw.parse::<Verbosity>() {
            Ok(v) => Some(v),
            Err(err) => {
                tracing::warn!(var = VERBOSITY_ENV, error = %err, "ignoring invalid verbosity");
                None
            }
        }
    };
    cli.or_else(from_env).or(config).unwrap_or_default()
}

fn level_from_log_level(lvl: LogLevel) -> tracing::Level {
    match lvl {
        LogLevel::Error => tracing::Level::ERROR,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Trace => tracing::Level::TRACE,
    }
}

fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_strings_are_case_insensitive() {
        assert_eq!(parse_level_str(" Debug "), Some(tracing::Level::DEBUG));
        assert_eq!(parse_level_str("warning"), Some(tracing::Level::WARN));
        assert_eq!(parse_level_str("chatty"), None);
    }

    #[test]
    fn cli_verbosity_beats_config() {
        assert_eq!(
            resolve_verbosity(Some(Verbosity::Quiet), Some(Verbosity::Verbose)),
            Verbosity::Quiet
        );
    }
}
