use std::time::Duration;

use tokio::sync::mpsc;

use appmon::logbus::{LogBus, LogLine, LogStream, PREFIX};
use appmon::types::Verbosity;

/// A LogBus writing into memory, plus the reader side.
pub fn capture(verbosity: Verbosity) -> (LogBus, LogCapture) {
    let (bus, rx) = LogBus::channel(verbosity);
    (bus, LogCapture { rx, seen: Vec::new() })
}

/// Collects everything written to a channel LogBus.
#[derive(Debug)]
pub struct LogCapture {
    rx: mpsc::UnboundedReceiver<LogLine>,
    seen: Vec<LogLine>,
}

impl LogCapture {
    /// Everything received so far, in order.
    pub fn lines(&mut self) -> Vec<String> {
        self.pump();
        self.seen.iter().map(|l| l.text.clone()).collect()
    }

    /// Status lines only, without the `[appmon] ` prefix.
    pub fn status_lines(&mut self) -> Vec<String> {
        self.pump();
        self.seen
            .iter()
            .filter(|l| l.stream == LogStream::Stdout)
            .filter_map(|l| l.text.strip_prefix(PREFIX))
            .map(|t| t.trim_start().to_string())
            .collect()
    }

    /// Number of status lines equal to `text`.
    pub fn count(&mut self, text: &str) -> usize {
        self.status_lines().iter().filter(|l| l.as_str() == text).count()
    }

    /// Wait until `text` has been seen `times` times as a status line.
    ///
    /// Returns false on timeout.
    pub async fn wait_for(&mut self, text: &str, times: usize, within: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            if self.count(text) >= times {
                return true;
            }
            match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Ok(Some(line)) => self.seen.push(line),
                Ok(None) | Err(_) => return self.count(text) >= times,
            }
        }
    }

    fn pump(&mut self) {
        while let Ok(line) = self.rx.try_recv() {
            self.seen.push(line);
        }
    }
}
