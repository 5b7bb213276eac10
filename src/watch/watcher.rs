// src/watch/watcher.rs

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace, warn};

use crate::engine::SupervisorEvent;
use crate::errors::{AppmonError, Result};
use crate::fs::FileSystem;
use crate::logbus::{LogBus, StatusLine};
use crate::watch::classifier::PathClassifier;
use crate::watch::debounce::Debouncer;

/// What kind of change a raw notification describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKind {
    Create,
    Modify,
    Remove,
    /// Reads and opens; never a change.
    Access,
    Other,
}

impl From<&EventKind> for RawKind {
    fn from(kind: &EventKind) -> Self {
        match kind {
            EventKind::Create(_) => RawKind::Create,
            EventKind::Modify(_) => RawKind::Modify,
            EventKind::Remove(_) => RawKind::Remove,
            EventKind::Access(_) => RawKind::Access,
            EventKind::Any | EventKind::Other => RawKind::Other,
        }
    }
}

/// A notification from the OS watcher, detached from `notify`'s types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawFsEvent {
    Changed { paths: Vec<PathBuf>, kind: RawKind },
    Error { paths: Vec<PathBuf>, message: String },
}

impl From<Event> for RawFsEvent {
    fn from(event: Event) -> Self {
        RawFsEvent::Changed {
            kind: RawKind::from(&event.kind),
            paths: event.paths,
        }
    }
}

impl From<notify::Error> for RawFsEvent {
    fn from(err: notify::Error) -> Self {
        let message = match &err.kind {
            notify::ErrorKind::Generic(msg) => msg.clone(),
            notify::ErrorKind::Io(io) => io.to_string(),
            notify::ErrorKind::PathNotFound => "path not found".to_string(),
            other => format!("{other:?}"),
        };
        RawFsEvent::Error {
            message,
            paths: err.paths,
        }
    }
}

/// Handle for the filesystem watcher.
///
/// Keeps the underlying `RecommendedWatcher` alive. Dropping this handle
/// stops OS watching and the event loop.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
    task: JoinHandle<()>,
    roots: Vec<PathBuf>,
}

impl WatcherHandle {
    /// Roots the OS watcher accepted at startup.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle")
            .field("roots", &self.roots)
            .finish_non_exhaustive()
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Start watching every root of `classifier`.
///
/// - Roots that cannot be watched are reported as warnings and skipped.
/// - If no root can be watched at all, this fails with a watch error.
/// - Files already matching a watch set are announced with
///   `watching new file: <path>`.
/// - Settled, classified changes are sent to `events` as
///   [`SupervisorEvent::FileChanged`].
pub fn spawn_watcher(
    classifier: Arc<PathClassifier>,
    debounce: Duration,
    events: mpsc::Sender<SupervisorEvent>,
    logbus: LogBus,
    fs: Arc<dyn FileSystem>,
) -> Result<WatcherHandle> {
    // Channel from the blocking notify callback into the async world.
    let (raw_tx, raw_rx) = mpsc::unbounded_channel::<RawFsEvent>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            let raw = match res {
                Ok(event) => RawFsEvent::from(event),
                Err(err) => RawFsEvent::from(err),
            };
            // The receiver is gone once the watch loop has stopped.
            let _ = raw_tx.send(raw);
        },
        Config::default(),
    )
    .map_err(|err| AppmonError::watch(classifier.root(), err.to_string()))?;

    let mut roots = Vec::new();
    for watch_root in classifier.watch_roots() {
        let mode = if watch_root.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        match watcher.watch(&watch_root.path, mode) {
            Ok(()) => {
                debug!(path = ?watch_root.path, recursive = watch_root.recursive, "watching root");
                roots.push(watch_root.path.clone());
            }
            Err(err) => {
                warn!(path = ?watch_root.path, error = %err, "failed to watch root; skipping it");
            }
        }
    }

    if roots.is_empty() {
        return Err(AppmonError::watch(
            classifier.root(),
            "none of the configured watch roots could be watched",
        ));
    }

    info!(root = ?classifier.root(), roots = roots.len(), "file watcher started");

    let mut known_files = HashSet::new();
    match classifier.collect_matching_files(fs.as_ref()) {
        Ok(files) => {
            for (category, path) in files {
                debug!(%category, ?path, "initial watched file");
                logbus.emit(&StatusLine::WatchingFile(classifier.display_path(&path)));
                known_files.insert(path);
            }
        }
        Err(err) => warn!(error = %err, "failed to enumerate watched files"),
    }

    let watch_loop = WatchLoop::new(
        classifier,
        debounce,
        raw_rx,
        events,
        logbus,
        roots.clone(),
        known_files,
        fs,
    );
    let task = tokio::spawn(watch_loop.run());

    Ok(WatcherHandle {
        _inner: watcher,
        task,
        roots,
    })
}

/// Async half of the watcher: classify, announce, debounce, forward.
///
/// Separate from [`spawn_watcher`] so it can be driven with synthetic
/// [`RawFsEvent`]s in tests.
pub struct WatchLoop {
    classifier: Arc<PathClassifier>,
    debouncer: Debouncer,
    raw_rx: mpsc::UnboundedReceiver<RawFsEvent>,
    events: mpsc::Sender<SupervisorEvent>,
    logbus: LogBus,
    active_roots: Vec<PathBuf>,
    known_files: HashSet<PathBuf>,
    fs: Arc<dyn FileSystem>,
}

impl WatchLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        classifier: Arc<PathClassifier>,
        debounce: Duration,
        raw_rx: mpsc::UnboundedReceiver<RawFsEvent>,
        events: mpsc::Sender<SupervisorEvent>,
        logbus: LogBus,
        active_roots: Vec<PathBuf>,
        known_files: HashSet<PathBuf>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            classifier,
            debouncer: Debouncer::new(debounce),
            raw_rx,
            events,
            logbus,
            active_roots,
            known_files,
            fs,
        }
    }

    /// Run until the raw channel closes or the supervisor goes away.
    pub async fn run(mut self) {
        loop {
            let deadline = self.debouncer.next_deadline();

            tokio::select! {
                raw = self.raw_rx.recv() => {
                    let Some(raw) = raw else {
                        debug!("raw watch channel closed; watcher stopping");
                        return;
                    };
                    if !self.handle_raw(raw).await {
                        return;
                    }
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    for change in self.debouncer.drain_due(Instant::now()) {
                        trace!(category = %change.category, path = ?change.path, "forwarding settled change");
                        if self.events.send(SupervisorEvent::FileChanged(change)).await.is_err() {
                            debug!("supervisor gone; watcher stopping");
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Returns false once the loop should stop.
    async fn handle_raw(&mut self, raw: RawFsEvent) -> bool {
        match raw {
            RawFsEvent::Error { paths, message } => {
                if paths.is_empty() {
                    warn!(%message, "file watcher error");
                    return true;
                }
                for path in paths {
                    self.drop_roots_under(&path, &message);
                }
                self.check_roots_remaining().await
            }
            RawFsEvent::Changed { kind: RawKind::Access, .. } => true,
            RawFsEvent::Changed { paths, kind } => {
                let now = Instant::now();
                for path in paths {
                    if kind == RawKind::Remove && self.is_root_or_ancestor(&path) {
                        self.drop_roots_under(&path, "watch root removed");
                        if !self.check_roots_remaining().await {
                            return false;
                        }
                        continue;
                    }
                    self.observe(path, kind, now);
                }
                true
            }
        }
    }

    fn observe(&mut self, path: PathBuf, kind: RawKind, now: Instant) {
        let Some(category) = self.classifier.classify(&path) else {
            trace!(?path, "unwatched path; dropping event");
            return;
        };

        if kind == RawKind::Remove {
            self.known_files.remove(&path);
        } else if !self.known_files.contains(&path) && self.fs.is_file(&path) {
            self.logbus
                .emit(&StatusLine::WatchingFile(self.classifier.display_path(&path)));
            self.known_files.insert(path.clone());
        }

        debug!(%category, ?path, ?kind, "classified change");
        self.debouncer.push(category, path, now);
    }

    fn is_root_or_ancestor(&self, path: &Path) -> bool {
        self.active_roots.iter().any(|root| root.starts_with(path))
    }

    fn drop_roots_under(&mut self, path: &Path, reason: &str) {
        self.active_roots.retain(|root| {
            let affected = root.starts_with(path);
            if affected {
                warn!(root = ?root, %reason, "dropping watch root");
            }
            !affected
        });
    }

    async fn check_roots_remaining(&mut self) -> bool {
        if !self.active_roots.is_empty() {
            return true;
        }
        let _ = self
            .events
            .send(SupervisorEvent::WatcherFailed {
                path: self.classifier.root().to_path_buf(),
                message: "no watch roots remain".to_string(),
            })
            .await;
        false
    }
}
