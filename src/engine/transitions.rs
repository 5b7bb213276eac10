// src/engine/transitions.rs

//! Event handlers of the supervisor core.
//!
//! Each handler takes the state by `&mut` and returns the [`CoreStep`] the
//! shell should execute. Commands are executed in order, so a `Terminate`
//! always completes before the `Spawn` that follows it.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::engine::core::SupervisorState;
use crate::engine::{ChildId, CoreCommand, CoreStep, Phase, SupervisorOptions};
use crate::exec::control::ControlMessage;
use crate::exec::output::LifecycleSignal;
use crate::logbus::StatusLine;
use crate::types::Category;
use crate::watch::debounce::ChangeEvent;
use crate::watch::path_utils::relative_str;

fn display(root: &Path, path: &Path) -> String {
    relative_str(root, path).unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// The terminate command needed before the next spawn, if any.
///
/// A crashed app that stays resident is killed outright. Otherwise the
/// child is only stopped if it has not been seen to exit.
fn terminate_command(state: &SupervisorState, options: &SupervisorOptions) -> Option<CoreCommand> {
    let crashed = matches!(state.phase, Phase::Crashed | Phase::AwaitingChange);
    if crashed && options.resident_after_crash {
        return Some(CoreCommand::Terminate { force: true });
    }
    state
        .child_alive
        .then_some(CoreCommand::Terminate { force: false })
}

/// Tear down the current child and launch a new one.
fn begin_restart(
    state: &mut SupervisorState,
    options: &SupervisorOptions,
    announce: StatusLine,
) -> Vec<CoreCommand> {
    let mut commands = vec![CoreCommand::Emit(announce)];
    commands.extend(terminate_command(state, options));
    commands.push(CoreCommand::Spawn);

    state.phase = Phase::Restarting;
    state.clear_pending();
    state.child = None;
    state.child_alive = false;
    commands
}

/// Enter `Crashed` and settle in `AwaitingChange`.
fn enter_crashed(state: &mut SupervisorState, reason: Option<String>) -> Vec<CoreCommand> {
    state.phase = Phase::Crashed;
    if state.has_pending() {
        debug!(
            pending_restart = state.pending_restart,
            pending_refresh = state.pending_refresh.len(),
            "discarding queued changes after crash"
        );
        state.clear_pending();
    }

    let mut commands = Vec::with_capacity(2);
    if let Some(reason) = reason {
        commands.push(CoreCommand::Emit(StatusLine::Crash(reason)));
    }
    commands.push(CoreCommand::Emit(StatusLine::WaitingForChange));
    state.phase = Phase::AwaitingChange;
    commands
}

fn is_current(state: &SupervisorState, child: ChildId) -> bool {
    if state.child == Some(child) {
        return true;
    }
    debug!(child, current = ?state.child, "ignoring event from superseded child");
    false
}

/// A debounced file change.
pub fn handle_file_change(
    state: &mut SupervisorState,
    options: &SupervisorOptions,
    root: &Path,
    change: ChangeEvent,
) -> CoreStep {
    let rel = display(root, &change.path);
    info!(category = %change.category, path = %rel, phase = ?state.phase, "file change");

    match state.phase {
        Phase::Launching | Phase::Restarting => {
            let line = match change.category {
                Category::Main => {
                    state.pending_restart = true;
                    StatusLine::MainFileChange(rel)
                }
                Category::Renderer => {
                    if !state.pending_refresh.contains(&change.path) {
                        state.pending_refresh.push(change.path);
                    }
                    StatusLine::RendererFileChange(rel)
                }
            };
            CoreStep::proceed(vec![CoreCommand::Emit(line)])
        }
        Phase::Ready => match change.category {
            Category::Main => {
                let mut commands = vec![CoreCommand::Emit(StatusLine::MainFileChange(rel))];
                commands.extend(begin_restart(state, options, StatusLine::RestartingDueToChange));
                CoreStep::proceed(commands)
            }
            Category::Renderer => CoreStep::proceed(vec![
                CoreCommand::Emit(StatusLine::RendererFileChange(rel)),
                CoreCommand::SendControl(ControlMessage::Refresh { path: change.path }),
            ]),
        },
        Phase::Crashed | Phase::AwaitingChange => {
            let mut commands = vec![CoreCommand::Emit(StatusLine::FileChange(rel))];
            commands.extend(begin_restart(state, options, StatusLine::RestartingDueToChange));
            CoreStep::proceed(commands)
        }
    }
}

/// A lifecycle marker printed by child `child`.
pub fn handle_signal(
    state: &mut SupervisorState,
    options: &SupervisorOptions,
    child: ChildId,
    signal: LifecycleSignal,
) -> CoreStep {
    if !is_current(state, child) {
        return CoreStep::idle();
    }

    match signal {
        LifecycleSignal::MainWindowOpen => match state.phase {
            Phase::Launching => {
                state.phase = Phase::Ready;
                state.last_known_good = Some(Instant::now());
                let mut commands = vec![CoreCommand::Emit(StatusLine::MainWindowOpen)];
                commands.extend(drain_pending(state, options));
                CoreStep::proceed(commands)
            }
            Phase::Ready => CoreStep::proceed(vec![CoreCommand::Emit(StatusLine::MainWindowOpen)]),
            phase => {
                debug!(?phase, "main window open outside of launch; ignoring");
                CoreStep::idle()
            }
        },
        LifecycleSignal::WatchingFile(path) => {
            CoreStep::proceed(vec![CoreCommand::Emit(StatusLine::WatchingFile(path))])
        }
        LifecycleSignal::FileChangeAck { category, path } => {
            debug!(%category, %path, "app acknowledged file change");
            CoreStep::idle()
        }
        LifecycleSignal::CrashDetected(reason) => {
            warn!(child, %reason, "app crashed");
            CoreStep::proceed(enter_crashed(state, Some(reason)))
        }
        LifecycleSignal::AwaitingChangeToRestart => {
            if state.phase == Phase::AwaitingChange {
                return CoreStep::idle();
            }
            CoreStep::proceed(enter_crashed(state, None))
        }
    }
}

/// Replay changes queued while launching. A pending restart wins.
fn drain_pending(state: &mut SupervisorState, options: &SupervisorOptions) -> Vec<CoreCommand> {
    if state.pending_restart {
        debug!("main change queued during launch; restarting");
        return begin_restart(state, options, StatusLine::RestartingDueToChange);
    }
    std::mem::take(&mut state.pending_refresh)
        .into_iter()
        .map(|path| CoreCommand::SendControl(ControlMessage::Refresh { path }))
        .collect()
}

/// Child `child` exited on its own or was reaped after a kill.
pub fn handle_child_exited(
    state: &mut SupervisorState,
    child: ChildId,
    code: Option<i32>,
) -> CoreStep {
    if !is_current(state, child) {
        return CoreStep::idle();
    }
    state.child_alive = false;

    match state.phase {
        Phase::Launching | Phase::Ready => {
            let reason = match code {
                Some(code) => format!("app exited with code {code}"),
                None => "app exited due to signal".to_string(),
            };
            warn!(child, ?code, "app exited unexpectedly");
            CoreStep::proceed(enter_crashed(state, Some(reason)))
        }
        phase => {
            debug!(child, ?code, ?phase, "app exited");
            CoreStep::idle()
        }
    }
}

/// The watcher has no roots left; nothing more can be observed.
pub fn handle_watcher_failed(
    state: &mut SupervisorState,
    options: &SupervisorOptions,
    path: PathBuf,
    message: String,
) -> CoreStep {
    let mut commands: Vec<CoreCommand> = terminate_command(state, options).into_iter().collect();
    commands.push(CoreCommand::Fail { path, message });
    state.child_alive = false;
    CoreStep::stop(commands)
}

pub fn handle_restart_request(state: &mut SupervisorState, options: &SupervisorOptions) -> CoreStep {
    info!(phase = ?state.phase, "restart requested");
    CoreStep::proceed(begin_restart(state, options, StatusLine::Restarting))
}

pub fn handle_reload_request(state: &mut SupervisorState) -> CoreStep {
    if state.phase != Phase::Ready {
        debug!(phase = ?state.phase, "reload requested while not ready; ignoring");
        return CoreStep::idle();
    }
    CoreStep::proceed(vec![CoreCommand::SendControl(ControlMessage::Reload)])
}

pub fn handle_shutdown(state: &mut SupervisorState, options: &SupervisorOptions) -> CoreStep {
    let mut commands = vec![CoreCommand::Emit(StatusLine::ShuttingDown)];
    commands.extend(terminate_command(state, options));
    state.child_alive = false;
    CoreStep::stop(commands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{SupervisorCore, SupervisorEvent};

    const ROOT: &str = "/proj";

    fn change(category: Category, rel: &str) -> SupervisorEvent {
        SupervisorEvent::FileChanged(ChangeEvent {
            category,
            path: Path::new(ROOT).join(rel),
            at: tokio::time::Instant::now(),
        })
    }

    fn signal(child: ChildId, signal: LifecycleSignal) -> SupervisorEvent {
        SupervisorEvent::Signal { child, signal }
    }

    fn emit(line: StatusLine) -> CoreCommand {
        CoreCommand::Emit(line)
    }

    /// Core that has spawned child 1 and seen its window open.
    fn ready_core(options: SupervisorOptions) -> SupervisorCore {
        let mut core = SupervisorCore::new(options, ROOT);
        assert_eq!(core.start().commands, vec![CoreCommand::Spawn]);
        core.child_started(1);
        core.step(signal(1, LifecycleSignal::MainWindowOpen));
        assert_eq!(core.phase(), Phase::Ready);
        core
    }

    #[test]
    fn main_change_in_ready_terminates_then_spawns() {
        let mut core = ready_core(SupervisorOptions::default());

        let step = core.step(change(Category::Main, "main.js"));
        assert!(step.keep_running);
        assert_eq!(
            step.commands,
            vec![
                emit(StatusLine::MainFileChange("main.js".into())),
                emit(StatusLine::RestartingDueToChange),
                CoreCommand::Terminate { force: false },
                CoreCommand::Spawn,
            ]
        );
        assert_eq!(core.phase(), Phase::Restarting);

        core.child_started(2);
        assert_eq!(core.phase(), Phase::Launching);
    }

    #[test]
    fn renderer_change_in_ready_only_refreshes() {
        let mut core = ready_core(SupervisorOptions::default());

        let step = core.step(change(Category::Renderer, "index.html"));
        assert_eq!(
            step.commands,
            vec![
                emit(StatusLine::RendererFileChange("index.html".into())),
                CoreCommand::SendControl(ControlMessage::Refresh {
                    path: PathBuf::from("/proj/index.html")
                }),
            ]
        );
        assert_eq!(core.phase(), Phase::Ready);
    }

    #[test]
    fn crash_waits_for_a_change_and_then_restarts() {
        let mut core = ready_core(SupervisorOptions::default());

        let step = core.step(signal(
            1,
            LifecycleSignal::CrashDetected("uncaught exception occured: pineapples".into()),
        ));
        assert_eq!(
            step.commands,
            vec![
                emit(StatusLine::Crash("uncaught exception occured: pineapples".into())),
                emit(StatusLine::WaitingForChange),
            ]
        );
        assert_eq!(core.phase(), Phase::AwaitingChange);

        // The child exits after printing the crash; nothing restarts.
        let step = core.step(SupervisorEvent::ChildExited { child: 1, code: Some(1) });
        assert!(step.commands.is_empty());
        assert_eq!(core.phase(), Phase::AwaitingChange);

        let step = core.step(change(Category::Main, "main.js"));
        assert_eq!(
            step.commands,
            vec![
                emit(StatusLine::FileChange("main.js".into())),
                emit(StatusLine::RestartingDueToChange),
                CoreCommand::Spawn,
            ]
        );
    }

    #[test]
    fn resident_crashed_app_is_force_killed_before_restart() {
        let mut core = ready_core(SupervisorOptions {
            resident_after_crash: true,
        });
        core.step(signal(1, LifecycleSignal::CrashDetected("boom".into())));

        let step = core.step(change(Category::Renderer, "renderer.js"));
        assert_eq!(
            step.commands,
            vec![
                emit(StatusLine::FileChange("renderer.js".into())),
                emit(StatusLine::RestartingDueToChange),
                CoreCommand::Terminate { force: true },
                CoreCommand::Spawn,
            ]
        );
    }

    #[test]
    fn alive_crashed_app_is_terminated_gracefully_without_residency() {
        let mut core = ready_core(SupervisorOptions::default());
        core.step(signal(1, LifecycleSignal::CrashDetected("boom".into())));

        let step = core.step(change(Category::Main, "main.js"));
        assert!(step.commands.contains(&CoreCommand::Terminate { force: false }));
    }

    #[test]
    fn changes_during_launch_are_queued_and_restart_wins() {
        let mut core = SupervisorCore::new(SupervisorOptions::default(), ROOT);
        core.start();
        core.child_started(1);

        let step = core.step(change(Category::Renderer, "index.html"));
        assert_eq!(step.commands, vec![emit(StatusLine::RendererFileChange("index.html".into()))]);
        core.step(change(Category::Main, "main.js"));
        assert!(core.state().pending_restart);

        let step = core.step(signal(1, LifecycleSignal::MainWindowOpen));
        assert_eq!(
            step.commands,
            vec![
                emit(StatusLine::MainWindowOpen),
                emit(StatusLine::RestartingDueToChange),
                CoreCommand::Terminate { force: false },
                CoreCommand::Spawn,
            ]
        );
        assert!(!core.state().has_pending());
    }

    #[test]
    fn queued_refreshes_are_sent_once_ready() {
        let mut core = SupervisorCore::new(SupervisorOptions::default(), ROOT);
        core.start();
        core.child_started(1);
        core.step(change(Category::Renderer, "index.html"));
        core.step(change(Category::Renderer, "index.html"));
        core.step(change(Category::Renderer, "renderer.js"));

        let step = core.step(signal(1, LifecycleSignal::MainWindowOpen));
        assert_eq!(
            step.commands,
            vec![
                emit(StatusLine::MainWindowOpen),
                CoreCommand::SendControl(ControlMessage::Refresh {
                    path: PathBuf::from("/proj/index.html")
                }),
                CoreCommand::SendControl(ControlMessage::Refresh {
                    path: PathBuf::from("/proj/renderer.js")
                }),
            ]
        );
    }

    #[test]
    fn crash_during_launch_discards_the_queue() {
        let mut core = SupervisorCore::new(SupervisorOptions::default(), ROOT);
        core.start();
        core.child_started(1);
        core.step(change(Category::Main, "main.js"));

        core.step(signal(1, LifecycleSignal::CrashDetected("App threw an error during load".into())));
        assert_eq!(core.phase(), Phase::AwaitingChange);
        assert!(!core.state().has_pending());
    }

    #[test]
    fn repeated_crashes_each_announce_waiting() {
        let mut core = ready_core(SupervisorOptions::default());
        core.step(signal(1, LifecycleSignal::CrashDetected("first".into())));
        let step = core.step(signal(1, LifecycleSignal::CrashDetected("second".into())));
        assert_eq!(
            step.commands,
            vec![emit(StatusLine::Crash("second".into())), emit(StatusLine::WaitingForChange)]
        );
    }

    #[test]
    fn awaiting_marker_enters_crashed_only_once() {
        let mut core = ready_core(SupervisorOptions::default());
        let step = core.step(signal(1, LifecycleSignal::AwaitingChangeToRestart));
        assert_eq!(step.commands, vec![emit(StatusLine::WaitingForChange)]);
        let step = core.step(signal(1, LifecycleSignal::AwaitingChangeToRestart));
        assert!(step.commands.is_empty());
    }

    #[test]
    fn unexpected_exit_counts_as_a_crash() {
        let mut core = ready_core(SupervisorOptions::default());
        let step = core.step(SupervisorEvent::ChildExited { child: 1, code: Some(3) });
        assert_eq!(
            step.commands,
            vec![
                emit(StatusLine::Crash("app exited with code 3".into())),
                emit(StatusLine::WaitingForChange),
            ]
        );
        assert!(!core.state().child_alive);

        // Exited child: no terminate before the restart spawn.
        let step = core.step(change(Category::Main, "main.js"));
        assert!(!step.commands.iter().any(|c| matches!(c, CoreCommand::Terminate { .. })));
    }

    #[test]
    fn signal_killed_child_reports_signal_reason() {
        let mut core = SupervisorCore::new(SupervisorOptions::default(), ROOT);
        core.start();
        core.child_started(1);
        let step = core.step(SupervisorEvent::ChildExited { child: 1, code: None });
        assert_eq!(step.commands[0], emit(StatusLine::Crash("app exited due to signal".into())));
    }

    #[test]
    fn events_from_superseded_children_are_ignored() {
        let mut core = ready_core(SupervisorOptions::default());
        core.step(change(Category::Main, "main.js"));
        core.child_started(2);

        let step = core.step(SupervisorEvent::ChildExited { child: 1, code: Some(143) });
        assert!(step.commands.is_empty());
        let step = core.step(signal(1, LifecycleSignal::CrashDetected("late".into())));
        assert!(step.commands.is_empty());
        assert_eq!(core.phase(), Phase::Launching);
    }

    #[test]
    fn manual_restart_leaves_awaiting_change() {
        let mut core = ready_core(SupervisorOptions::default());
        core.step(SupervisorEvent::ChildExited { child: 1, code: Some(1) });

        let step = core.step(SupervisorEvent::RestartRequested);
        assert_eq!(step.commands, vec![emit(StatusLine::Restarting), CoreCommand::Spawn]);
        assert_eq!(core.phase(), Phase::Restarting);
    }

    #[test]
    fn reload_only_when_ready() {
        let mut core = SupervisorCore::new(SupervisorOptions::default(), ROOT);
        core.start();
        core.child_started(1);
        assert!(core.step(SupervisorEvent::ReloadRequested).commands.is_empty());

        core.step(signal(1, LifecycleSignal::MainWindowOpen));
        assert_eq!(
            core.step(SupervisorEvent::ReloadRequested).commands,
            vec![CoreCommand::SendControl(ControlMessage::Reload)]
        );
    }

    #[test]
    fn shutdown_terminates_and_stops() {
        let mut core = ready_core(SupervisorOptions::default());
        let step = core.step(SupervisorEvent::ShutdownRequested);
        assert!(!step.keep_running);
        assert_eq!(
            step.commands,
            vec![emit(StatusLine::ShuttingDown), CoreCommand::Terminate { force: false }]
        );
    }

    #[test]
    fn watcher_failure_is_fatal() {
        let mut core = ready_core(SupervisorOptions::default());
        let step = core.step(SupervisorEvent::WatcherFailed {
            path: PathBuf::from("/proj"),
            message: "root removed".into(),
        });
        assert!(!step.keep_running);
        assert_eq!(
            step.commands,
            vec![
                CoreCommand::Terminate { force: false },
                CoreCommand::Fail {
                    path: PathBuf::from("/proj"),
                    message: "root removed".into()
                },
            ]
        );
    }
}
