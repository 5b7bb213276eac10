// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::types::Verbosity;

/// Command-line arguments for `appmon`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "appmon",
    version,
    about = "Restart or refresh a desktop app whenever its sources change.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// The directory containing it is the project root.
    #[arg(long, value_name = "PATH", default_value = "Appmon.toml")]
    pub config: String,

    /// Diagnostic logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `APPMON_LOG` or `warn` is used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Which status lines to print (quiet, info, verbose).
    ///
    /// If omitted, `APPMON_LOGLEVEL`, then `[log] level`, then `info`.
    #[arg(long, value_name = "LEVEL")]
    pub verbosity: Option<Verbosity>,

    /// Validate the config, print what would be launched and watched, exit.
    #[arg(long)]
    pub dry_run: bool,

    /// Launch command overriding `[app] command` and `args`.
    #[arg(last = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
