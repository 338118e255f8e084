//! Scripted leaf runner and recording listener shared by unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::runner::backend::{LeafRunner, RunListener};
use crate::runner::executor::CancellationToken;
use crate::runner::result::{FailureRecord, TestIdentity};
use crate::suite::declaration::TestClass;

/// Runner whose behaviour is driven by each case's command string.
///
/// - none or `pass`: passes
/// - `fail:<msg>[|<msg>...]`: one assertion failure per message
/// - `error:<type>:<msg>`: exception-style failure
/// - `cancel`: cancels the attached token, then passes
/// - `stop`: requests a stop on the runner itself, then passes
pub(crate) struct ScriptedRunner {
    stop: AtomicBool,
    cancel: Option<CancellationToken>,
    started: Mutex<Vec<String>>,
    pub(crate) stop_requests: AtomicUsize,
}

impl ScriptedRunner {
    pub(crate) fn new() -> Self {
        Self {
            stop: AtomicBool::new(false),
            cancel: None,
            started: Mutex::new(Vec::new()),
            stop_requests: AtomicUsize::new(0),
        }
    }

    pub(crate) fn cancelling(token: CancellationToken) -> Self {
        Self {
            cancel: Some(token),
            ..Self::new()
        }
    }

    /// Identities of every leaf started so far, in order.
    pub(crate) fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }
}

impl LeafRunner for ScriptedRunner {
    fn name(&self) -> &str {
        "scripted"
    }

    fn leaf_count(&self, class: &TestClass) -> usize {
        class.cases.len()
    }

    fn execute(&self, class: &TestClass, listener: &mut dyn RunListener) {
        self.stop.store(false, Ordering::SeqCst);
        for case in &class.cases {
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            let identity = class.identity(case);
            if identity.ignore_reason().is_some() {
                listener.test_ignored(&identity);
                continue;
            }

            self.started.lock().unwrap().push(identity.to_string());
            listener.test_started(&identity);
            match case.command.as_deref() {
                Some(cmd) if cmd.starts_with("fail:") => {
                    for message in cmd["fail:".len()..].split('|') {
                        listener.test_failure(
                            &identity,
                            FailureRecord::assertion(message, format!("at {identity}")),
                        );
                    }
                }
                Some(cmd) if cmd.starts_with("error:") => {
                    let (ty, message) = cmd["error:".len()..]
                        .split_once(':')
                        .unwrap_or(("Error", ""));
                    listener.test_failure(
                        &identity,
                        FailureRecord::exception(ty, message, format!("{ty}: {message}")),
                    );
                }
                Some("cancel") => {
                    if let Some(token) = &self.cancel {
                        token.cancel();
                    }
                }
                Some("stop") => self.request_stop(),
                _ => {}
            }
            listener.test_finished(&identity);
        }
    }

    fn request_stop(&self) {
        self.stop_requests.fetch_add(1, Ordering::SeqCst);
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// Listener that records each event as a line of text.
#[derive(Default)]
pub(crate) struct RecordingListener {
    pub(crate) events: Vec<String>,
}

impl RunListener for RecordingListener {
    fn test_started(&mut self, identity: &TestIdentity) {
        self.events.push(format!("started {identity}"));
    }

    fn test_ignored(&mut self, identity: &TestIdentity) {
        self.events.push(format!("ignored {identity}"));
    }

    fn test_failure(&mut self, identity: &TestIdentity, failure: FailureRecord) {
        self.events
            .push(format!("failure {identity} {}", failure.message));
    }

    fn test_finished(&mut self, identity: &TestIdentity) {
        self.events.push(format!("finished {identity}"));
    }
}
