use std::sync::{Arc, Mutex};
use std::time::Duration;

use appmon::engine::ChildId;
use appmon::errors::{AppmonError, Result};
use appmon::exec::{BackendFuture, ControlMessage, ProcessBackend};

/// One call the runtime made on the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Start(ChildId),
    Terminate { force: bool },
    SendControl(ControlMessage),
}

/// Shared view of the calls recorded by a [`FakeBackend`].
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<BackendCall>>>,
}

impl CallLog {
    pub fn snapshot(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn starts(&self) -> usize {
        self.count(|c| matches!(c, BackendCall::Start(_)))
    }

    pub fn terminates(&self) -> usize {
        self.count(|c| matches!(c, BackendCall::Terminate { .. }))
    }

    pub fn controls(&self) -> Vec<ControlMessage> {
        self.snapshot()
            .into_iter()
            .filter_map(|c| match c {
                BackendCall::SendControl(msg) => Some(msg),
                _ => None,
            })
            .collect()
    }

    fn count(&self, pred: impl Fn(&BackendCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    fn push(&self, call: BackendCall) {
        self.calls.lock().unwrap().push(call);
    }
}

/// A backend that never spawns anything.
///
/// - `start` hands out ids 1, 2, 3, ... and records them.
/// - `terminate` and `send_control` only record the call.
/// - Failures can be injected for a given start, or for every terminate.
#[derive(Debug, Default)]
pub struct FakeBackend {
    log: CallLog,
    next_id: ChildId,
    fail_start_on: Option<ChildId>,
    fail_terminate: bool,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    /// Make the `nth` start (1-based) fail with a spawn error.
    pub fn fail_start_on(mut self, nth: ChildId) -> Self {
        self.fail_start_on = Some(nth);
        self
    }

    /// Make every terminate fail with a termination timeout.
    pub fn fail_terminate(mut self) -> Self {
        self.fail_terminate = true;
        self
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }
}

impl ProcessBackend for FakeBackend {
    fn start(&mut self) -> BackendFuture<'_, Result<ChildId>> {
        let id = self.next_id;
        self.next_id += 1;
        let result = if self.fail_start_on == Some(id) {
            Err(AppmonError::SpawnError {
                command: "fake-app".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "fake-app not found"),
            })
        } else {
            self.log.push(BackendCall::Start(id));
            Ok(id)
        };
        Box::pin(async move { result })
    }

    fn send_control(&mut self, message: ControlMessage) -> BackendFuture<'_, ()> {
        self.log.push(BackendCall::SendControl(message));
        Box::pin(async {})
    }

    fn terminate(&mut self, force: bool) -> BackendFuture<'_, Result<()>> {
        self.log.push(BackendCall::Terminate { force });
        let result = if self.fail_terminate {
            Err(AppmonError::TerminationTimeout {
                pid: None,
                timeout: Duration::from_secs(3),
            })
        } else {
            Ok(())
        };
        Box::pin(async move { result })
    }
}
