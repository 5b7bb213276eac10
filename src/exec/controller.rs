// src/exec/controller.rs

//! Lifecycle of the single controlled child process.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStdin, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::ConfigFile;
use crate::engine::{ChildId, SupervisorEvent};
use crate::errors::{AppmonError, Result};
use crate::exec::control::ControlMessage;
use crate::exec::output::spawn_output_reader;
use crate::logbus::{LogBus, LogStream};

/// How long the reaper waits for stdout and stderr to drain after the
/// process exits.
///
/// Grandchildren can keep the pipe open indefinitely; past this point the
/// exit is reported anyway.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildState {
    NotStarted,
    Starting,
    Running,
    Crashed,
    Terminating,
    Exited,
}

/// Everything needed to launch the controlled app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: PathBuf,
}

impl LaunchSpec {
    pub fn from_config(cfg: &ConfigFile, root: &Path) -> Self {
        let cwd = match cfg.app.cwd.as_deref() {
            Some(dir) => root.join(dir),
            None => root.to_path_buf(),
        };
        Self {
            program: cfg.app.command.clone(),
            args: cfg.app.args.clone(),
            env: cfg.app.env.clone(),
            cwd,
        }
    }

    /// `program arg1 arg2`, for log messages.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// The one occupied slot of the controller.
struct ChildSlot {
    id: ChildId,
    pid: Option<u32>,
    started_at: Instant,
    state: Arc<Mutex<ChildState>>,
    stdin: Option<ChildStdin>,
    kill_tx: Option<oneshot::Sender<()>>,
    exited: watch::Receiver<bool>,
}

impl ChildSlot {
    fn has_exited(&self) -> bool {
        *self.exited.borrow()
    }

    fn state(&self) -> ChildState {
        self.state.lock().map(|s| *s).unwrap_or(ChildState::Exited)
    }

    fn set_state(&self, next: ChildState) {
        if let Ok(mut s) = self.state.lock() {
            *s = next;
        }
    }

    /// Resolves once the reaper has observed the exit (or has gone away).
    async fn wait_exited(&mut self) {
        let _ = self.exited.wait_for(|exited| *exited).await;
    }

    fn force_kill(&mut self) {
        if let Some(kill) = self.kill_tx.take() {
            let _ = kill.send(());
        }
    }

    /// Pid that may still be signalled: `None` once the reaper has seen the
    /// exit, since the pid can be reused from then on.
    #[cfg(unix)]
    fn signal_target(&self) -> Option<u32> {
        if self.has_exited() { None } else { self.pid }
    }

    /// Ask the child to exit on its own.
    ///
    /// SIGTERM is sent before the shutdown line, while the pid is known to
    /// be unreaped.
    async fn request_graceful_exit(&mut self) {
        #[cfg(unix)]
        if let Some(pid) = self.signal_target() {
            send_sigterm(pid);
        }
        if let Some(mut stdin) = self.stdin.take() {
            if let Ok(line) = ControlMessage::Shutdown.to_line() {
                let _ = stdin.write_all(line.as_bytes()).await;
                let _ = stdin.flush().await;
            }
            // Dropping stdin closes the control channel.
        }
    }
}

#[cfg(unix)]
fn send_sigterm(pid: u32) -> bool {
    // SAFETY: kill(2) has no memory-safety preconditions; the pid belongs to
    // a child we have not reaped yet.
    unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) == 0 }
}

/// Starts, signals and stops the controlled app.
///
/// Holds at most one child. Output and exit of that child are reported to
/// the supervisor as [`SupervisorEvent`]s tagged with its [`ChildId`].
pub struct ChildProcessController {
    spec: LaunchSpec,
    terminate_timeout: Duration,
    events: mpsc::Sender<SupervisorEvent>,
    logbus: LogBus,
    next_id: ChildId,
    slot: Option<ChildSlot>,
}

impl std::fmt::Debug for ChildProcessController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildProcessController")
            .field("spec", &self.spec)
            .field("current", &self.slot.as_ref().map(|s| (s.id, s.pid, s.state())))
            .finish_non_exhaustive()
    }
}

impl ChildProcessController {
    pub fn new(
        spec: LaunchSpec,
        terminate_timeout: Duration,
        events: mpsc::Sender<SupervisorEvent>,
        logbus: LogBus,
    ) -> Self {
        Self {
            spec,
            terminate_timeout,
            events,
            logbus,
            next_id: 1,
            slot: None,
        }
    }

    /// Lifecycle state of the current (or last) child.
    pub fn state(&self) -> ChildState {
        self.slot
            .as_ref()
            .map(ChildSlot::state)
            .unwrap_or(ChildState::NotStarted)
    }

    pub fn current_pid(&self) -> Option<u32> {
        self.slot.as_ref().filter(|s| !s.has_exited()).and_then(|s| s.pid)
    }

    /// Spawn the app. Refuses while a previous child is still alive.
    pub async fn start(&mut self) -> Result<ChildId> {
        if let Some(slot) = &self.slot {
            if !slot.has_exited() {
                return Err(AppmonError::Other(anyhow::anyhow!(
                    "child {} (pid {:?}) is still running; terminate it first",
                    slot.id,
                    slot.pid
                )));
            }
        }

        let mut cmd = Command::new(&self.spec.program);
        cmd.args(&self.spec.args)
            .envs(&self.spec.env)
            .current_dir(&self.spec.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| AppmonError::SpawnError {
            command: self.spec.display(),
            source,
        })?;

        let id = self.next_id;
        self.next_id += 1;
        let pid = child.id();

        info!(child = id, ?pid, cmd = %self.spec.display(), "started app process");

        let state = Arc::new(Mutex::new(ChildState::Starting));

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_output_reader(
                id,
                LogStream::Stdout,
                stdout,
                self.events.clone(),
                self.logbus.clone(),
                Arc::clone(&state),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_output_reader(
                id,
                LogStream::Stderr,
                stderr,
                self.events.clone(),
                self.logbus.clone(),
                Arc::clone(&state),
            ));
        }
        let stdin = child.stdin.take();

        let (kill_tx, mut kill_rx) = oneshot::channel::<()>();
        let (exited_tx, exited_rx) = watch::channel(false);
        let events = self.events.clone();
        let reaper_state = Arc::clone(&state);

        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                Ok(()) = &mut kill_rx => {
                    debug!(child = id, "force-killing app process");
                    if let Err(err) = child.start_kill() {
                        warn!(child = id, error = %err, "failed to kill app process");
                    }
                    child.wait().await
                }
            };
            let _ = exited_tx.send(true);
            if let Ok(mut s) = reaper_state.lock() {
                *s = ChildState::Exited;
            }

            let code = match status {
                Ok(status) => status.code(),
                Err(err) => {
                    warn!(child = id, error = %err, "failed to wait for app process");
                    None
                }
            };
            debug!(child = id, ?code, "app process exited");

            // Report the exit only after the child's own output on both
            // streams, so a crash marker is seen before the exit it caused.
            let drained = timeout(OUTPUT_DRAIN_GRACE, async {
                for reader in readers {
                    let _ = reader.await;
                }
            })
            .await;
            if drained.is_err() {
                debug!(child = id, "output still open after exit; reporting exit anyway");
            }
            let _ = events.send(SupervisorEvent::ChildExited { child: id, code }).await;
        });

        self.slot = Some(ChildSlot {
            id,
            pid,
            started_at: Instant::now(),
            state,
            stdin,
            kill_tx: Some(kill_tx),
            exited: exited_rx,
        });

        Ok(id)
    }

    /// Best-effort write to the control channel; a no-op unless `Running`.
    pub async fn send_control(&mut self, message: ControlMessage) {
        let Some(slot) = self.slot.as_mut() else {
            debug!(?message, "no app process; dropping control message");
            return;
        };
        if slot.state() != ChildState::Running {
            debug!(child = slot.id, state = ?slot.state(), ?message, "app not running; dropping control message");
            return;
        }
        let Some(stdin) = slot.stdin.as_mut() else {
            return;
        };

        let line = match message.to_line() {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "failed to encode control message");
                return;
            }
        };
        let write = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await
        };
        if let Err(err) = write.await {
            debug!(child = slot.id, error = %err, "control channel closed");
            slot.stdin = None;
        }
    }

    /// Stop the current child and empty the slot.
    ///
    /// - Already exited or never started: returns immediately.
    /// - `force = false`: ask politely, then kill after the timeout.
    /// - `force = true`: kill right away (the child is known to be stuck).
    ///
    /// Fails only if the child is still alive a full timeout after the kill.
    pub async fn terminate(&mut self, force: bool) -> Result<()> {
        let Some(slot) = self.slot.as_mut() else {
            return Ok(());
        };
        if slot.has_exited() {
            debug!(child = slot.id, "terminate: app already exited");
            self.slot = None;
            return Ok(());
        }

        slot.set_state(ChildState::Terminating);
        let grace = self.terminate_timeout;
        let uptime = slot.started_at.elapsed();
        debug!(child = slot.id, pid = ?slot.pid, force, ?uptime, "terminating app process");

        let mut exited = false;
        if !force {
            slot.request_graceful_exit().await;
            exited = timeout(grace, slot.wait_exited()).await.is_ok();
            if !exited {
                warn!(child = slot.id, ?grace, "app did not exit in time; killing it");
            }
        }

        if !exited {
            slot.force_kill();
            if timeout(grace, slot.wait_exited()).await.is_err() {
                return Err(AppmonError::TerminationTimeout {
                    pid: slot.pid,
                    timeout: grace,
                });
            }
        }

        info!(child = slot.id, "app process stopped");
        self.slot = None;
        Ok(())
    }
}
