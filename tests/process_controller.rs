// tests/process_controller.rs
#![cfg(unix)]

mod common;
use crate::common::{capture, init_tracing, with_timeout, LogCapture};

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;

use appmon::engine::{ChildId, SupervisorEvent};
use appmon::errors::AppmonError;
use appmon::exec::{ChildProcessController, ChildState, ControlMessage, LaunchSpec, LifecycleSignal};
use appmon::types::Verbosity;

fn sh(script: &str) -> LaunchSpec {
    LaunchSpec {
        program: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        env: BTreeMap::new(),
        cwd: std::env::temp_dir(),
    }
}

fn controller(
    spec: LaunchSpec,
    timeout: Duration,
) -> (ChildProcessController, mpsc::Receiver<SupervisorEvent>, LogCapture) {
    init_tracing();
    let (tx, rx) = mpsc::channel(64);
    let (logbus, log) = capture(Verbosity::Verbose);
    (ChildProcessController::new(spec, timeout, tx, logbus), rx, log)
}

async fn next_event(rx: &mut mpsc::Receiver<SupervisorEvent>) -> SupervisorEvent {
    with_timeout(rx.recv()).await.expect("event channel closed")
}

async fn wait_for_signal(rx: &mut mpsc::Receiver<SupervisorEvent>, child: ChildId) -> LifecycleSignal {
    loop {
        if let SupervisorEvent::Signal { child: from, signal } = next_event(rx).await {
            assert_eq!(from, child);
            return signal;
        }
    }
}

async fn wait_for_exit(rx: &mut mpsc::Receiver<SupervisorEvent>, child: ChildId) -> Option<i32> {
    loop {
        if let SupervisorEvent::ChildExited { child: from, code } = next_event(rx).await {
            assert_eq!(from, child);
            return code;
        }
    }
}

const ECHO_APP: &str = r#"echo "main window open"; while IFS= read -r line; do echo "got $line"; done"#;

#[tokio::test]
async fn readiness_control_and_graceful_stop() {
    let (mut ctl, mut rx, mut log) = controller(sh(ECHO_APP), Duration::from_secs(3));

    let id = ctl.start().await.unwrap();
    assert_eq!(wait_for_signal(&mut rx, id).await, LifecycleSignal::MainWindowOpen);
    assert_eq!(ctl.state(), ChildState::Running);

    ctl.send_control(ControlMessage::Refresh {
        path: PathBuf::from("/proj/index.html"),
    })
    .await;
    let expected = r#"got {"type":"refresh","path":"/proj/index.html"}"#;
    with_timeout(async {
        while !log.lines().iter().any(|l| l == expected) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    ctl.terminate(false).await.unwrap();
    assert_eq!(ctl.state(), ChildState::NotStarted);
    assert!(ctl.current_pid().is_none());
    wait_for_exit(&mut rx, id).await;

    // Already stopped: a no-op, never a timeout.
    ctl.terminate(false).await.unwrap();
    ctl.terminate(true).await.unwrap();
}

#[tokio::test]
async fn control_messages_are_dropped_before_readiness() {
    let (mut ctl, mut rx, mut log) = controller(
        sh(r#"while IFS= read -r line; do echo "got $line"; done"#),
        Duration::from_secs(3),
    );
    let id = ctl.start().await.unwrap();
    assert_eq!(ctl.state(), ChildState::Starting);

    ctl.send_control(ControlMessage::Reload).await;
    ctl.terminate(false).await.unwrap();
    wait_for_exit(&mut rx, id).await;

    assert!(!log.lines().iter().any(|l| l.contains("reload")));
}

#[tokio::test]
async fn stubborn_child_is_killed_after_the_timeout() {
    let (mut ctl, mut rx, _log) = controller(
        sh(r#"trap '' TERM; echo "main window open"; while true; do sleep 0.1; done"#),
        Duration::from_millis(300),
    );
    let id = ctl.start().await.unwrap();
    assert_eq!(wait_for_signal(&mut rx, id).await, LifecycleSignal::MainWindowOpen);

    let started = tokio::time::Instant::now();
    ctl.terminate(false).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(wait_for_exit(&mut rx, id).await, None);
}

#[tokio::test]
async fn crash_marker_arrives_before_the_exit() {
    let (mut ctl, mut rx, _log) = controller(
        sh(r#"echo "uncaught exception occured: pineapples"; exit 3"#),
        Duration::from_secs(3),
    );
    let id = ctl.start().await.unwrap();

    match next_event(&mut rx).await {
        SupervisorEvent::Signal { child, signal } => {
            assert_eq!(child, id);
            assert_eq!(
                signal,
                LifecycleSignal::CrashDetected("uncaught exception occured: pineapples".into())
            );
        }
        other => panic!("expected crash signal first, got {other:?}"),
    }
    assert_eq!(wait_for_exit(&mut rx, id).await, Some(3));

    // The slot holds an exited child; terminate just clears it.
    ctl.terminate(false).await.unwrap();
}

#[tokio::test]
async fn stderr_is_passed_through_and_scanned_for_crashes() {
    let (mut ctl, mut rx, mut log) = controller(
        sh(r#"echo "main window open" >&2; echo "Uncaught Exception: TypeError" >&2; exec cat"#),
        Duration::from_secs(3),
    );
    let id = ctl.start().await.unwrap();

    assert!(matches!(
        wait_for_signal(&mut rx, id).await,
        LifecycleSignal::CrashDetected(_)
    ));
    assert!(log.lines().iter().any(|l| l == "main window open"));
    assert_eq!(ctl.state(), ChildState::Crashed);

    ctl.terminate(false).await.unwrap();
}

#[tokio::test]
async fn refuses_a_second_live_child() {
    let (mut ctl, mut rx, _log) = controller(sh("exec cat"), Duration::from_secs(3));
    let first = ctl.start().await.unwrap();
    assert!(ctl.start().await.is_err());

    ctl.terminate(false).await.unwrap();
    wait_for_exit(&mut rx, first).await;

    let second = ctl.start().await.unwrap();
    assert!(second > first);
    ctl.terminate(false).await.unwrap();
}

#[tokio::test]
async fn missing_binary_is_a_spawn_error() {
    let spec = LaunchSpec {
        program: "/nonexistent/appmon-fixture-app".to_string(),
        args: Vec::new(),
        env: BTreeMap::new(),
        cwd: std::env::temp_dir(),
    };
    let (mut ctl, _rx, _log) = controller(spec, Duration::from_secs(1));

    let err = ctl.start().await.unwrap_err();
    assert!(matches!(err, AppmonError::SpawnError { .. }));
    assert_eq!(err.exit_code(), 3);
}

#[tokio::test]
async fn shutdown_line_stops_an_app_that_ignores_sigterm() {
    let (mut ctl, mut rx, mut log) = controller(
        sh(r#"trap '' TERM; echo "main window open"; IFS= read -r line; echo "got $line"; exit 0"#),
        Duration::from_secs(5),
    );
    let id = ctl.start().await.unwrap();
    assert_eq!(wait_for_signal(&mut rx, id).await, LifecycleSignal::MainWindowOpen);

    let started = tokio::time::Instant::now();
    ctl.terminate(false).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(wait_for_exit(&mut rx, id).await, Some(0));
    assert!(log.lines().iter().any(|l| l == r#"got {"type":"shutdown"}"#));

    // Nothing left to signal once the child is gone.
    ctl.terminate(false).await.unwrap();
}

#[tokio::test]
async fn stderr_crash_marker_arrives_before_the_exit() {
    for _ in 0..10 {
        let (mut ctl, mut rx, _log) = controller(
            sh(r#"echo "Uncaught Exception: TypeError: boom" >&2; exit 3"#),
            Duration::from_secs(3),
        );
        let id = ctl.start().await.unwrap();

        match next_event(&mut rx).await {
            SupervisorEvent::Signal { child, signal } => {
                assert_eq!(child, id);
                assert!(matches!(signal, LifecycleSignal::CrashDetected(_)));
            }
            other => panic!("expected crash signal first, got {other:?}"),
        }
        assert_eq!(wait_for_exit(&mut rx, id).await, Some(3));
        ctl.terminate(false).await.unwrap();
    }
}
