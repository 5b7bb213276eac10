// src/logbus.rs

//! The user-facing status line protocol.
//!
//! Every state change the supervisor wants a developer (or a test harness)
//! to see is a [`StatusLine`]. Lines are written one per event, prefixed with
//! `[appmon]`, to stdout. Diagnostics go through `tracing` to stderr instead,
//! so stdout stays machine-readable.
//!
//! Output from the controlled app is passed through verbatim on the stream it
//! arrived on and is never filtered by verbosity.

use std::fmt;
use std::io::Write;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::types::Verbosity;

/// Prefix on every status line.
pub const PREFIX: &str = "[appmon]";

/// One entry of the fixed status vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusLine {
    WatchingFile(String),
    MainWindowOpen,
    MainFileChange(String),
    RendererFileChange(String),
    /// A change of any category while the app is crashed.
    FileChange(String),
    RestartingDueToChange,
    /// Restart requested through the control handle.
    Restarting,
    /// Opaque crash description, forwarded verbatim.
    Crash(String),
    WaitingForChange,
    ShuttingDown,
}

impl StatusLine {
    /// Lowest verbosity at which this line is shown.
    pub fn level(&self) -> Verbosity {
        match self {
            StatusLine::WatchingFile(_)
            | StatusLine::MainFileChange(_)
            | StatusLine::RendererFileChange(_)
            | StatusLine::FileChange(_) => Verbosity::Verbose,
            StatusLine::MainWindowOpen
            | StatusLine::RestartingDueToChange
            | StatusLine::Restarting
            | StatusLine::ShuttingDown => Verbosity::Info,
            StatusLine::Crash(_) | StatusLine::WaitingForChange => Verbosity::Quiet,
        }
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusLine::WatchingFile(p) => write!(f, "watching new file: {p}"),
            StatusLine::MainWindowOpen => f.write_str("main window open"),
            StatusLine::MainFileChange(p) => write!(f, "main file change: {p}"),
            StatusLine::RendererFileChange(p) => write!(f, "renderer file change: {p}"),
            StatusLine::FileChange(p) => write!(f, "file change: {p}"),
            StatusLine::RestartingDueToChange => f.write_str("restarting app due to file change"),
            StatusLine::Restarting => f.write_str("restarting app"),
            StatusLine::Crash(reason) => f.write_str(reason),
            StatusLine::WaitingForChange => f.write_str("waiting for any change to restart the app"),
            StatusLine::ShuttingDown => f.write_str("shutting down"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// A line as delivered to a channel sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub stream: LogStream,
    pub text: String,
}

#[derive(Debug)]
enum LogSink {
    Stdio,
    Channel(mpsc::UnboundedSender<LogLine>),
}

/// Cheaply cloneable handle to the status line output.
#[derive(Debug, Clone)]
pub struct LogBus {
    verbosity: Verbosity,
    sink: Arc<LogSink>,
}

impl LogBus {
    /// Write to the process's stdout/stderr.
    pub fn stdio(verbosity: Verbosity) -> Self {
        Self {
            verbosity,
            sink: Arc::new(LogSink::Stdio),
        }
    }

    /// Deliver lines to a channel instead, for embedding and tests.
    pub fn channel(verbosity: Verbosity) -> (Self, mpsc::UnboundedReceiver<LogLine>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let bus = Self {
            verbosity,
            sink: Arc::new(LogSink::Channel(tx)),
        };
        (bus, rx)
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Emit a status line if the configured verbosity allows it.
    pub fn emit(&self, line: &StatusLine) {
        debug!(target: "appmon::status", status = %line, "status line");
        if line.level() > self.verbosity {
            return;
        }
        self.write(LogStream::Stdout, &format!("{PREFIX} {line}"));
    }

    /// Forward a line of app output unchanged.
    pub fn passthrough(&self, stream: LogStream, line: &str) {
        self.write(stream, line);
    }

    fn write(&self, stream: LogStream, text: &str) {
        match self.sink.as_ref() {
            LogSink::Stdio => {
                // A closed stdout/stderr must not take the supervisor down.
                let _ = match stream {
                    LogStream::Stdout => writeln!(std::io::stdout().lock(), "{text}"),
                    LogStream::Stderr => writeln!(std::io::stderr().lock(), "{text}"),
                };
            }
            LogSink::Channel(tx) => {
                let _ = tx.send(LogLine {
                    stream,
                    text: text.to_string(),
                });
            }
        }
    }
}
