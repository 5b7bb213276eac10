// src/exec/output.rs

//! Turn the child's output into lifecycle signals.
//!
//! Bytes are reassembled into lines first ([`LineAssembler`]), so a marker
//! split across two pipe reads is still recognised. Each complete line is
//! stripped of ANSI color codes and matched against the [`Marker`] table in
//! order; the first match wins. Lines that match nothing are passed through
//! to the LogBus verbatim.

use std::borrow::Cow;
use std::sync::{Arc, LazyLock, Mutex};

use regex::Regex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::engine::{ChildId, SupervisorEvent};
use crate::exec::controller::ChildState;
use crate::logbus::{LogBus, LogStream};
use crate::types::Category;

/// Bumped whenever the marker wording or order changes.
pub const MARKER_VERSION: u32 = 1;

/// What a line of child output means to the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleSignal {
    MainWindowOpen,
    WatchingFile(String),
    FileChangeAck { category: Category, path: String },
    CrashDetected(String),
    AwaitingChangeToRestart,
}

/// Recognised markers, in match order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Crash,
    AwaitingChange,
    MainWindowOpen,
    WatchingFile,
    FileChangeAck,
}

impl Marker {
    pub const ORDER: [Marker; 5] = [
        Marker::Crash,
        Marker::AwaitingChange,
        Marker::MainWindowOpen,
        Marker::WatchingFile,
        Marker::FileChangeAck,
    ];

    fn pattern(self) -> &'static str {
        match self {
            Marker::Crash => {
                r"(?i)(uncaught exception occur+ed|uncaught exception:|app threw an error during load)"
            }
            Marker::AwaitingChange => r"(?i)waiting for any change to restart the app",
            Marker::MainWindowOpen => r"(?i)\bmain window open\b",
            Marker::WatchingFile => r"(?i)watching new file:\s*(?P<path>\S.*?)\s*$",
            Marker::FileChangeAck => {
                r"(?i)\b(?P<category>main|renderer) file change:\s*(?P<path>\S.*?)\s*$"
            }
        }
    }

    /// Markers that count when seen on stderr.
    fn applies_to(self, stream: LogStream) -> bool {
        match stream {
            LogStream::Stdout => true,
            LogStream::Stderr => self == Marker::Crash,
        }
    }

    fn signal(self, line: &str, caps: &regex::Captures<'_>) -> Option<LifecycleSignal> {
        let group = |name: &str| caps.name(name).map(|m| m.as_str().to_string());
        match self {
            Marker::Crash => Some(LifecycleSignal::CrashDetected(line.trim().to_string())),
            Marker::AwaitingChange => Some(LifecycleSignal::AwaitingChangeToRestart),
            Marker::MainWindowOpen => Some(LifecycleSignal::MainWindowOpen),
            Marker::WatchingFile => group("path").map(LifecycleSignal::WatchingFile),
            Marker::FileChangeAck => {
                let category = group("category")?.parse().ok()?;
                let path = group("path")?;
                Some(LifecycleSignal::FileChangeAck { category, path })
            }
        }
    }
}

static MARKERS: LazyLock<Vec<(Marker, Regex)>> = LazyLock::new(|| {
    Marker::ORDER
        .iter()
        .map(|m| (*m, Regex::new(m.pattern()).expect("marker patterns are valid regexes")))
        .collect()
});

static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").expect("ANSI escape pattern is a valid regex")
});

/// Remove ANSI escape sequences (colors, cursor movement).
pub fn strip_ansi(line: &str) -> Cow<'_, str> {
    ANSI_ESCAPE.replace_all(line, "")
}

/// Classify one complete line of output from `stream`.
pub fn classify_line(stream: LogStream, line: &str) -> Option<LifecycleSignal> {
    let clean = strip_ansi(line);
    MARKERS
        .iter()
        .filter(|(marker, _)| marker.applies_to(stream))
        .find_map(|(marker, re)| re.captures(&clean).and_then(|caps| marker.signal(&clean, &caps)))
}

/// Buffers raw bytes until a line terminator is seen.
#[derive(Debug, Default)]
pub struct LineAssembler {
    buf: Vec<u8>,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and return every line they complete.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let rest = self.buf.split_off(pos + 1);
            let mut line = std::mem::replace(&mut self.buf, rest);
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

/// A complete line and what it means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub text: String,
    pub signal: Option<LifecycleSignal>,
}

/// Line reassembly plus classification for one output stream of one child.
///
/// A fresh parser is created for every spawned child.
#[derive(Debug)]
pub struct OutputSignalParser {
    stream: LogStream,
    assembler: LineAssembler,
}

impl OutputSignalParser {
    pub fn new(stream: LogStream) -> Self {
        Self {
            stream,
            assembler: LineAssembler::new(),
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<ParsedLine> {
        self.assembler
            .push(bytes)
            .into_iter()
            .map(|text| self.parse(text))
            .collect()
    }

    pub fn finish(&mut self) -> Option<ParsedLine> {
        self.assembler.finish().map(|text| self.parse(text))
    }

    fn parse(&self, text: String) -> ParsedLine {
        let signal = classify_line(self.stream, &text);
        ParsedLine { text, signal }
    }
}

/// Spawn a task that reads one output stream of child `child` until EOF.
///
/// Signals are forwarded to the supervisor and mirrored into the child's
/// state cell; everything else is passed through to the LogBus.
pub fn spawn_output_reader<R>(
    child: ChildId,
    stream: LogStream,
    mut reader: R,
    events: mpsc::Sender<SupervisorEvent>,
    logbus: LogBus,
    state: Arc<Mutex<ChildState>>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut parser = OutputSignalParser::new(stream);
        let mut buf = vec![0u8; 8192];

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) => {
                    debug!(child, ?stream, error = %err, "output stream read failed");
                    break;
                }
            };
            for line in parser.feed(&buf[..n]) {
                if !forward(child, stream, line, &events, &logbus, &state).await {
                    return;
                }
            }
        }

        if let Some(line) = parser.finish() {
            forward(child, stream, line, &events, &logbus, &state).await;
        }
        debug!(child, ?stream, "output reader finished");
    })
}

/// Returns false once the supervisor has gone away.
async fn forward(
    child: ChildId,
    stream: LogStream,
    line: ParsedLine,
    events: &mpsc::Sender<SupervisorEvent>,
    logbus: &LogBus,
    state: &Arc<Mutex<ChildState>>,
) -> bool {
    let Some(signal) = line.signal else {
        logbus.passthrough(stream, &line.text);
        return true;
    };

    trace!(child, ?signal, "lifecycle signal");
    if let Ok(mut current) = state.lock() {
        match &signal {
            LifecycleSignal::MainWindowOpen if *current == ChildState::Starting => {
                *current = ChildState::Running;
            }
            LifecycleSignal::CrashDetected(_) | LifecycleSignal::AwaitingChangeToRestart => {
                *current = ChildState::Crashed;
            }
            _ => {}
        }
    }

    events
        .send(SupervisorEvent::Signal { child, signal })
        .await
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_fixed_vocabulary() {
        let out = LogStream::Stdout;
        assert_eq!(
            classify_line(out, "[app] main window open"),
            Some(LifecycleSignal::MainWindowOpen)
        );
        assert_eq!(
            classify_line(out, "watching new file: src/main.js"),
            Some(LifecycleSignal::WatchingFile("src/main.js".into()))
        );
        assert_eq!(
            classify_line(out, "renderer file change: index.html  "),
            Some(LifecycleSignal::FileChangeAck {
                category: Category::Renderer,
                path: "index.html".into()
            })
        );
        assert_eq!(
            classify_line(out, "waiting for any change to restart the app"),
            Some(LifecycleSignal::AwaitingChangeToRestart)
        );
        assert_eq!(classify_line(out, "hello from the app"), None);
    }

    #[test]
    fn crash_markers_win_and_keep_the_whole_line() {
        let line = "  uncaught exception occured: main window open failed ";
        assert_eq!(
            classify_line(LogStream::Stdout, line),
            Some(LifecycleSignal::CrashDetected(
                "uncaught exception occured: main window open failed".into()
            ))
        );
        assert!(matches!(
            classify_line(LogStream::Stdout, "App threw an error during load"),
            Some(LifecycleSignal::CrashDetected(_))
        ));
    }

    #[test]
    fn stderr_only_yields_crash_signals() {
        assert_eq!(classify_line(LogStream::Stderr, "main window open"), None);
        assert!(matches!(
            classify_line(LogStream::Stderr, "Uncaught Exception: TypeError: x is undefined"),
            Some(LifecycleSignal::CrashDetected(_))
        ));
    }

    #[test]
    fn ansi_colors_do_not_hide_markers() {
        let colored = "\x1b[32m[electron]\x1b[0m main window open";
        assert_eq!(strip_ansi(colored), "[electron] main window open");
        assert_eq!(
            classify_line(LogStream::Stdout, colored),
            Some(LifecycleSignal::MainWindowOpen)
        );
    }

    #[test]
    fn assembler_reassembles_split_lines() {
        let mut asm = LineAssembler::new();
        assert!(asm.push(b"main win").is_empty());
        assert_eq!(asm.push(b"dow open\r\nnext"), vec!["main window open".to_string()]);
        assert_eq!(asm.push(b" line\n\n"), vec!["next line".to_string(), String::new()]);
        assert_eq!(asm.push(b"tail"), Vec::<String>::new());
        assert_eq!(asm.finish(), Some("tail".to_string()));
        assert_eq!(asm.finish(), None);
    }

    #[test]
    fn parser_attaches_signals_to_completed_lines_only() {
        let mut parser = OutputSignalParser::new(LogStream::Stdout);
        assert!(parser.feed(b"uncaught exception occ").is_empty());
        let lines = parser.feed(b"ured: pineapples\nplain\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0].signal,
            Some(LifecycleSignal::CrashDetected("uncaught exception occured: pineapples".into()))
        );
        assert_eq!(lines[1], ParsedLine { text: "plain".into(), signal: None });
    }

    #[tokio::test]
    async fn reader_forwards_signals_and_passes_through_the_rest() {
        let (events_tx, mut events_rx) = mpsc::channel(8);
        let (logbus, mut log_rx) = LogBus::channel(crate::types::Verbosity::Verbose);
        let state = Arc::new(Mutex::new(ChildState::Starting));

        let input: &[u8] = b"booting\nmain window open\n";
        let handle = spawn_output_reader(
            7,
            LogStream::Stdout,
            input,
            events_tx,
            logbus,
            Arc::clone(&state),
        );
        handle.await.unwrap();

        match events_rx.recv().await {
            Some(SupervisorEvent::Signal { child: 7, signal }) => {
                assert_eq!(signal, LifecycleSignal::MainWindowOpen)
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(log_rx.recv().await.unwrap().text, "booting");
        assert_eq!(*state.lock().unwrap(), ChildState::Running);
    }
}
