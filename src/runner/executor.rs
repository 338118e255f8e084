use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::runner::aggregator::{ResultAggregator, ResultsByClass, RunSummary};
use crate::runner::backend::{LeafRunner, RunListener};
use crate::runner::resolver::{ResolutionError, SuiteResolver};
use crate::runner::result::{FailureRecord, TestIdentity, TestResult};
use crate::suite::declaration::Declaration;

/// Shared, monotonic cancellation flag.
///
/// Cancelling is idempotent and may happen from any thread. The executor only
/// observes it at leaf event boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
}

/// One terminal leaf result plus run-wide progress at that point.
#[derive(Debug, Clone)]
pub struct Progress {
    pub result: TestResult,
    /// Leaf count fixed before the first leaf ran.
    pub total: usize,
    /// Leaves processed so far, this one included.
    pub processed: usize,
    /// Whether any failure has been seen in the run so far.
    pub run_has_failures: bool,
}

/// Messages sent from the run thread to its consumer, in event order.
#[derive(Debug, Clone)]
pub enum RunMessage {
    /// Resolution finished; sent once, before any progress.
    Resolved { total: usize, classes: usize },
    Progress(Progress),
}

/// Final counters of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub outcome: RunOutcome,
    pub total: usize,
    pub processed: usize,
    pub run_has_failures: bool,
    pub elapsed: Duration,
}

/// A finished (or cancelled) run and everything it recorded.
#[derive(Debug, Clone)]
pub struct CompletedRun {
    pub root: String,
    pub stats: RunStats,
    pub results: ResultsByClass,
}

impl CompletedRun {
    pub fn summary(&self) -> RunSummary {
        RunSummary::from_results(&self.results)
    }

    pub fn is_cancelled(&self) -> bool {
        self.stats.outcome == RunOutcome::Cancelled
    }
}

/// Errors that end a run without an outcome.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error("failed to start run thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("run thread panicked")]
    Panicked,
}

/// Mutable state of a single run, owned by the run thread.
#[derive(Debug)]
struct RunState {
    total: usize,
    processed: usize,
    run_has_failures: bool,
    stop_requested: bool,
}

/// Drives resolution and leaf execution for one root declaration at a time.
#[derive(Clone)]
pub struct TestExecutor {
    runner: Arc<dyn LeafRunner>,
}

impl TestExecutor {
    pub fn new(runner: Arc<dyn LeafRunner>) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &dyn LeafRunner {
        self.runner.as_ref()
    }

    /// Run `root` on a background thread and wait for it, forwarding each
    /// terminal leaf result to `on_progress` on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Resolution`] if the tree cannot be resolved; no
    /// leaf has run in that case.
    pub fn run(
        &self,
        root: Declaration,
        token: &CancellationToken,
        mut on_progress: impl FnMut(&Progress),
    ) -> Result<CompletedRun, RunError> {
        self.spawn(root, token.clone())?.wait(|message| {
            if let RunMessage::Progress(progress) = message {
                on_progress(progress);
            }
        })
    }

    /// Start `root` on a dedicated thread.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Spawn`] if the thread cannot be created.
    pub fn spawn(
        &self,
        root: Declaration,
        token: CancellationToken,
    ) -> Result<RunHandle, RunError> {
        let (sender, messages) = mpsc::channel();
        let executor = self.clone();
        let root_name = root.name().to_owned();
        let thread = thread::Builder::new()
            .name("leafsuite-run".to_owned())
            .spawn(move || {
                executor.execute(&root, &token, &mut |message| {
                    // The consumer may have gone away; the run still completes.
                    let _ = sender.send(message);
                })
            })
            .map_err(RunError::Spawn)?;

        Ok(RunHandle {
            root: root_name,
            messages,
            thread,
        })
    }

    /// Resolve and execute `root` on the current thread, passing every
    /// message to `sink` as it is produced.
    ///
    /// The leaf count is computed before anything runs. Cancellation is
    /// checked at every leaf event; once observed, the runner is asked to
    /// stop and no further class is started.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError`] before any leaf runs if the tree cannot
    /// be resolved.
    pub fn execute(
        &self,
        root: &Declaration,
        token: &CancellationToken,
        sink: &mut dyn FnMut(RunMessage),
    ) -> Result<RunStats, ResolutionError> {
        let start = Instant::now();
        let resolver = SuiteResolver::new(self.runner.as_ref());
        let total = resolver.count_leaves(root)?;
        let classes = resolver.expand(root)?;
        info!(
            root = root.name(),
            runner = self.runner.name(),
            total,
            classes = classes.len(),
            "resolved test run"
        );
        sink(RunMessage::Resolved {
            total,
            classes: classes.len(),
        });

        let mut state = RunState {
            total,
            processed: 0,
            run_has_failures: false,
            stop_requested: false,
        };
        let mut outcome = RunOutcome::Completed;

        for class in &classes {
            if state.stop_requested || token.is_cancelled() {
                outcome = RunOutcome::Cancelled;
                break;
            }
            debug!(class = %class.name, "executing class");
            let mut listener = ExecutorListener {
                state: &mut state,
                current: None,
                token,
                runner: self.runner.as_ref(),
                sink: &mut *sink,
            };
            self.runner.execute(class, &mut listener);
            if let Some((unfinished, _)) = listener.current.take() {
                warn!(test = %unfinished.identity, "test started but never finished");
            }
        }
        if state.stop_requested {
            outcome = RunOutcome::Cancelled;
        }

        let stats = RunStats {
            outcome,
            total,
            processed: state.processed,
            run_has_failures: state.run_has_failures,
            elapsed: start.elapsed(),
        };
        if outcome == RunOutcome::Cancelled {
            warn!(processed = stats.processed, total, "test run cancelled");
        } else {
            info!(
                processed = stats.processed,
                failures = stats.run_has_failures,
                "test run completed"
            );
        }
        Ok(stats)
    }
}

/// Handle to a run executing on its own thread.
pub struct RunHandle {
    root: String,
    messages: Receiver<RunMessage>,
    thread: JoinHandle<Result<RunStats, ResolutionError>>,
}

impl RunHandle {
    /// Consume messages until the run ends, recording every result.
    ///
    /// `on_message` runs on the calling thread, in the order the run thread
    /// produced the messages.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Resolution`] if resolution failed, or
    /// [`RunError::Panicked`] if the run thread panicked.
    pub fn wait(self, mut on_message: impl FnMut(&RunMessage)) -> Result<CompletedRun, RunError> {
        let mut aggregator = ResultAggregator::new();
        for message in self.messages.iter() {
            on_message(&message);
            if let RunMessage::Progress(progress) = message {
                aggregator.record(progress.result);
            }
        }
        let stats = self.thread.join().map_err(|_| RunError::Panicked)??;
        Ok(CompletedRun {
            root: self.root,
            stats,
            results: aggregator.into_results(),
        })
    }
}

fn same_test(a: &TestIdentity, b: &TestIdentity) -> bool {
    a.class_name == b.class_name && a.method_name == b.method_name
}

/// Converts one class's leaf events into [`RunMessage::Progress`] messages.
struct ExecutorListener<'a> {
    state: &'a mut RunState,
    current: Option<(TestResult, Instant)>,
    token: &'a CancellationToken,
    runner: &'a dyn LeafRunner,
    sink: &'a mut dyn FnMut(RunMessage),
}

impl ExecutorListener<'_> {
    fn check_cancelled(&mut self) {
        if !self.state.stop_requested && self.token.is_cancelled() {
            debug!("cancellation observed, asking runner to stop");
            self.state.stop_requested = true;
            self.runner.request_stop();
        }
    }

    /// Whether `identity` is the leaf currently in flight.
    fn in_flight(&self, identity: &TestIdentity) -> bool {
        self.current
            .as_ref()
            .is_some_and(|(result, _)| same_test(&result.identity, identity))
    }

    /// After a stop, only events of the leaf already in flight are accepted.
    fn rejects(&self, identity: &TestIdentity, event: &str) -> bool {
        if self.state.stop_requested && !self.in_flight(identity) {
            warn!(test = %identity, event, "event after stop request dropped");
            return true;
        }
        false
    }

    /// Publish a terminal result. Only leaf results advance `processed`.
    fn publish(&mut self, result: TestResult, is_leaf: bool) {
        if is_leaf {
            self.state.processed += 1;
        }
        self.state.run_has_failures |= result.has_failures();
        trace!(test = %result.identity, status = %result.status(), "test done");
        (self.sink)(RunMessage::Progress(Progress {
            result,
            total: self.state.total,
            processed: self.state.processed,
            run_has_failures: self.state.run_has_failures,
        }));
    }
}

impl RunListener for ExecutorListener<'_> {
    fn test_started(&mut self, identity: &TestIdentity) {
        self.check_cancelled();
        if self.state.stop_requested {
            warn!(test = %identity, "test started after stop request dropped");
            return;
        }
        if let Some((stale, _)) = self.current.take() {
            warn!(test = %stale.identity, "test started before the previous one finished");
        }
        self.current = Some((
            TestResult::started(identity.clone(), self.state.total),
            Instant::now(),
        ));
    }

    fn test_ignored(&mut self, identity: &TestIdentity) {
        self.check_cancelled();
        if self.rejects(identity, "ignored") {
            return;
        }
        // Some runners report `started` before deciding to skip.
        self.current
            .take_if(|(result, _)| same_test(&result.identity, identity));
        let reason = identity.ignore_reason().unwrap_or_default().to_owned();
        self.publish(
            TestResult::ignored(identity.clone(), reason, self.state.total),
            true,
        );
    }

    fn test_failure(&mut self, identity: &TestIdentity, failure: FailureRecord) {
        self.check_cancelled();
        if self.rejects(identity, "failure") {
            return;
        }
        self.state.run_has_failures = true;
        if let Some((result, _)) = self.current.as_mut()
            && same_test(&result.identity, identity)
        {
            result.add_failure(failure);
            return;
        }

        // Class-level failures arrive without a `started` of their own and
        // are not one of the counted leaves.
        warn!(test = %identity, "failure reported outside a running test");
        let mut result = TestResult::started(identity.clone(), self.state.total);
        result.add_failure(failure);
        result.finish(Duration::ZERO);
        self.publish(result, false);
    }

    fn test_finished(&mut self, identity: &TestIdentity) {
        self.check_cancelled();
        if self.rejects(identity, "finished") {
            return;
        }
        let result = match self
            .current
            .take_if(|(result, _)| same_test(&result.identity, identity))
        {
            Some((mut result, started)) => {
                result.finish(started.elapsed());
                result
            }
            None => {
                warn!(test = %identity, "test finished without being started");
                let mut result = TestResult::started(identity.clone(), self.state.total);
                result.finish(Duration::ZERO);
                result
            }
        };
        self.publish(result, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::runner::result::TestStatus;
    use crate::runner::test_runners::ScriptedRunner;
    use crate::suite::declaration::{CaseDecl, CompositeSuite, SuiteError, TestClass};

    fn mixed_class() -> TestClass {
        TestClass::new("demo.MathTests")
            .with_case(CaseDecl::new("passes"))
            .with_case(CaseDecl::new("fails").with_command("fail:expected:<1> but was:<2>"))
            .with_case(CaseDecl::new("skipped").ignored("flaky"))
    }

    fn simple(name: &str, cases: &[&str]) -> Declaration {
        cases
            .iter()
            .fold(TestClass::new(name), |class, case| {
                class.with_case(CaseDecl::new(*case))
            })
            .into()
    }

    fn collect(
        runner: Arc<ScriptedRunner>,
        root: Declaration,
        token: &CancellationToken,
    ) -> (Result<RunStats, ResolutionError>, Vec<RunMessage>) {
        collect_with(runner, root, token)
    }

    fn collect_with(
        runner: Arc<dyn LeafRunner>,
        root: Declaration,
        token: &CancellationToken,
    ) -> (Result<RunStats, ResolutionError>, Vec<RunMessage>) {
        let executor = TestExecutor::new(runner);
        let mut messages = Vec::new();
        let stats = executor.execute(&root, token, &mut |m| messages.push(m));
        (stats, messages)
    }

    fn progress(messages: &[RunMessage]) -> Vec<&Progress> {
        messages
            .iter()
            .filter_map(|m| match m {
                RunMessage::Progress(p) => Some(p),
                RunMessage::Resolved { .. } => None,
            })
            .collect()
    }

    #[test]
    fn token_cancel_is_idempotent_and_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn mixed_class_produces_pass_fail_ignored() {
        let runner = Arc::new(ScriptedRunner::new());
        let (stats, messages) = collect(runner, mixed_class().into(), &CancellationToken::new());
        let stats = stats.unwrap();

        assert_eq!(stats.outcome, RunOutcome::Completed);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.processed, 3);
        assert!(stats.run_has_failures);

        let updates = progress(&messages);
        let statuses: Vec<TestStatus> = updates.iter().map(|p| p.result.status()).collect();
        assert_eq!(
            statuses,
            vec![TestStatus::Passed, TestStatus::Failed, TestStatus::Ignored]
        );
        assert_eq!(
            updates[1].result.failures[0].message,
            "expected:<1> but was:<2>"
        );
        assert_eq!(updates[2].result.ignored_reason.as_deref(), Some("flaky"));
    }

    #[test]
    fn resolved_message_precedes_progress() {
        let runner = Arc::new(ScriptedRunner::new());
        let (_, messages) = collect(runner, mixed_class().into(), &CancellationToken::new());
        assert!(matches!(
            messages[0],
            RunMessage::Resolved {
                total: 3,
                classes: 1
            }
        ));
        let processed: Vec<usize> = progress(&messages).iter().map(|p| p.processed).collect();
        assert_eq!(processed, vec![1, 2, 3]);
        assert!(progress(&messages).iter().all(|p| p.total == 3));
    }

    #[test]
    fn failure_flag_is_monotonic() {
        let runner = Arc::new(ScriptedRunner::new());
        let root = TestClass::new("demo.Tests")
            .with_case(CaseDecl::new("ok"))
            .with_case(CaseDecl::new("bad").with_command("fail:nope"))
            .with_case(CaseDecl::new("ok_again"));
        let (_, messages) = collect(runner, root.into(), &CancellationToken::new());
        let flags: Vec<bool> = progress(&messages)
            .iter()
            .map(|p| p.run_has_failures)
            .collect();
        assert_eq!(flags, vec![false, true, true]);
    }

    #[test]
    fn multiple_failures_stay_on_one_result() {
        let runner = Arc::new(ScriptedRunner::new());
        let root = TestClass::new("demo.Tests")
            .with_case(CaseDecl::new("bad").with_command("fail:first|second"));
        let (_, messages) = collect(runner, root.into(), &CancellationToken::new());
        let updates = progress(&messages);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].result.failures.len(), 2);
        assert!(updates[0].result.finished);
    }

    #[test]
    fn nested_suites_run_first_branch_before_second() {
        let runner = Arc::new(ScriptedRunner::new());
        let root: Declaration = CompositeSuite::with_children(
            "demo.AllTests",
            vec![
                CompositeSuite::with_children("demo.First", vec![simple("demo.A", &["a1", "a2"])])
                    .into(),
                CompositeSuite::with_children("demo.Second", vec![simple("demo.B", &["b1", "b2"])])
                    .into(),
            ],
        )
        .into();
        let (stats, _) = collect(Arc::clone(&runner), root, &CancellationToken::new());
        assert_eq!(stats.unwrap().total, 4);
        assert_eq!(
            runner.started(),
            vec!["demo.A::a1", "demo.A::a2", "demo.B::b1", "demo.B::b2"]
        );
    }

    #[test]
    fn count_matches_terminal_events_for_full_run() {
        let runner = Arc::new(ScriptedRunner::new());
        let root: Declaration = CompositeSuite::with_children(
            "demo.AllTests",
            vec![mixed_class().into(), simple("demo.Other", &["x", "y"])],
        )
        .into();
        let (stats, messages) = collect(runner, root, &CancellationToken::new());
        let stats = stats.unwrap();
        assert_eq!(stats.total, 5);
        assert_eq!(progress(&messages).len(), stats.total);
    }

    #[test]
    fn resolution_error_runs_nothing() {
        let runner = Arc::new(ScriptedRunner::new());
        let root: Declaration = CompositeSuite::with_children(
            "demo.AllTests",
            vec![
                mixed_class().into(),
                CompositeSuite::new("demo.Broken", || -> Result<Vec<Declaration>, SuiteError> {
                    Err(SuiteError::new("boom"))
                })
                .into(),
            ],
        )
        .into();
        let (stats, messages) = collect(Arc::clone(&runner), root, &CancellationToken::new());
        assert!(matches!(stats, Err(ResolutionError::Factory { .. })));
        assert!(messages.is_empty());
        assert!(runner.started().is_empty());
    }

    #[test]
    fn cancellation_mid_run_stops_after_current_leaf() {
        let token = CancellationToken::new();
        let runner = Arc::new(ScriptedRunner::cancelling(token.clone()));
        let root: Declaration = CompositeSuite::with_children(
            "demo.AllTests",
            vec![
                TestClass::new("demo.A")
                    .with_case(CaseDecl::new("first"))
                    .with_case(CaseDecl::new("cancels").with_command("cancel"))
                    .with_case(CaseDecl::new("never"))
                    .into(),
                simple("demo.B", &["also_never"]),
            ],
        )
        .into();

        let (stats, messages) = collect(Arc::clone(&runner), root, &token);
        let stats = stats.unwrap();
        assert_eq!(stats.outcome, RunOutcome::Cancelled);
        assert_eq!(stats.processed, 2);
        assert!(stats.processed <= stats.total);
        assert_eq!(progress(&messages).len(), 2);
        assert_eq!(runner.started(), vec!["demo.A::first", "demo.A::cancels"]);
        assert_eq!(runner.stop_requests.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancelled_before_start_runs_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let runner = Arc::new(ScriptedRunner::new());
        let (stats, _) = collect(Arc::clone(&runner), mixed_class().into(), &token);
        let stats = stats.unwrap();
        assert_eq!(stats.outcome, RunOutcome::Cancelled);
        assert_eq!(stats.processed, 0);
        assert!(runner.started().is_empty());
    }

    /// Runner that reports a class-level failure with no `started`.
    struct ClassSetupFails;

    impl LeafRunner for ClassSetupFails {
        fn name(&self) -> &str {
            "setup-fails"
        }
        fn leaf_count(&self, class: &TestClass) -> usize {
            class.cases.len()
        }
        fn execute(&self, class: &TestClass, listener: &mut dyn RunListener) {
            let identity = TestIdentity::new(class.name.clone(), "classMethod");
            listener.test_failure(
                &identity,
                FailureRecord::exception("SetupError", "fixture missing", "trace"),
            );
        }
        fn request_stop(&self) {}
    }

    #[test]
    fn failure_without_started_becomes_its_own_result() {
        let executor = TestExecutor::new(Arc::new(ClassSetupFails));
        let mut messages = Vec::new();
        let stats = executor
            .execute(
                &TestClass::new("demo.Tests").into(),
                &CancellationToken::new(),
                &mut |m| messages.push(m),
            )
            .unwrap();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.processed, 0);
        assert!(stats.run_has_failures);
        let updates = progress(&messages);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].result.status(), TestStatus::Failed);
        assert!(updates[0].result.has_errors());
    }

    /// Runner that reports a class-level failure after every leaf finished.
    struct TeardownFails;

    impl LeafRunner for TeardownFails {
        fn name(&self) -> &str {
            "teardown-fails"
        }
        fn leaf_count(&self, class: &TestClass) -> usize {
            class.cases.len()
        }
        fn execute(&self, class: &TestClass, listener: &mut dyn RunListener) {
            for case in &class.cases {
                let identity = class.identity(case);
                listener.test_started(&identity);
                listener.test_finished(&identity);
            }
            listener.test_failure(
                &TestIdentity::new(class.name.clone(), "classMethod"),
                FailureRecord::exception("TeardownError", "cleanup failed", ""),
            );
        }
        fn request_stop(&self) {}
    }

    #[test]
    fn class_failure_after_leaves_keeps_progress_within_total() {
        let executor = TestExecutor::new(Arc::new(TeardownFails));
        let mut messages = Vec::new();
        let stats = executor
            .execute(
                &simple("demo.Tests", &["one", "two"]),
                &CancellationToken::new(),
                &mut |m| messages.push(m),
            )
            .unwrap();

        assert_eq!(stats.total, 2);
        assert_eq!(stats.processed, 2);
        assert!(stats.run_has_failures);
        let updates = progress(&messages);
        assert_eq!(updates.len(), 3);
        assert!(updates.iter().all(|p| p.processed <= p.total));
        assert_eq!(updates[2].result.identity.method_name, "classMethod");
        assert_eq!(updates[2].processed, 2);
        assert_eq!(updates[2].result.status(), TestStatus::Failed);
    }

    /// Runner that reports `finished` with no preceding `started`.
    struct FinishOnly;

    impl LeafRunner for FinishOnly {
        fn name(&self) -> &str {
            "finish-only"
        }
        fn leaf_count(&self, class: &TestClass) -> usize {
            class.cases.len()
        }
        fn execute(&self, class: &TestClass, listener: &mut dyn RunListener) {
            for case in &class.cases {
                listener.test_finished(&class.identity(case));
            }
        }
        fn request_stop(&self) {}
    }

    #[test]
    fn finished_without_started_is_a_zero_duration_pass() {
        let executor = TestExecutor::new(Arc::new(FinishOnly));
        let mut messages = Vec::new();
        let stats = executor
            .execute(
                &simple("demo.Tests", &["only"]),
                &CancellationToken::new(),
                &mut |m| messages.push(m),
            )
            .unwrap();

        assert_eq!(stats.processed, 1);
        let updates = progress(&messages);
        assert_eq!(updates.len(), 1);
        let result = &updates[0].result;
        assert_eq!(result.status(), TestStatus::Passed);
        assert!(result.finished);
        assert_eq!(result.duration, Duration::ZERO);
    }

    /// Runner that cancels during its first leaf and never honours
    /// `request_stop`.
    struct IgnoresStop {
        token: CancellationToken,
        stop_requests: AtomicUsize,
    }

    impl LeafRunner for IgnoresStop {
        fn name(&self) -> &str {
            "ignores-stop"
        }
        fn leaf_count(&self, class: &TestClass) -> usize {
            class.cases.len()
        }
        fn execute(&self, class: &TestClass, listener: &mut dyn RunListener) {
            for (i, case) in class.cases.iter().enumerate() {
                let identity = class.identity(case);
                if identity.ignore_reason().is_some() {
                    listener.test_ignored(&identity);
                    continue;
                }
                listener.test_started(&identity);
                if i == 0 {
                    self.token.cancel();
                }
                listener.test_failure(&identity, FailureRecord::assertion("late", ""));
                listener.test_finished(&identity);
            }
        }
        fn request_stop(&self) {
            self.stop_requests.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn no_leaf_is_recorded_after_stop_even_if_runner_continues() {
        let token = CancellationToken::new();
        let runner = Arc::new(IgnoresStop {
            token: token.clone(),
            stop_requests: AtomicUsize::new(0),
        });
        let root: Declaration = TestClass::new("demo.Tests")
            .with_case(CaseDecl::new("first"))
            .with_case(CaseDecl::new("second"))
            .with_case(CaseDecl::new("skipped").ignored("later"))
            .with_case(CaseDecl::new("third"))
            .into();

        let (stats, messages) = collect_with(Arc::<IgnoresStop>::clone(&runner), root, &token);
        let stats = stats.unwrap();
        assert_eq!(stats.outcome, RunOutcome::Cancelled);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.processed, 1);
        let names: Vec<&str> = progress(&messages)
            .iter()
            .map(|p| p.result.identity.method_name.as_str())
            .collect();
        assert_eq!(names, vec!["first"]);
        // The leaf in flight when the stop was observed keeps its failure.
        assert_eq!(progress(&messages)[0].result.failures.len(), 1);
        assert_eq!(runner.stop_requests.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn run_collects_results_by_class_on_caller_thread() {
        let runner = Arc::new(ScriptedRunner::new());
        let executor = TestExecutor::new(runner);
        let root: Declaration = CompositeSuite::with_children(
            "demo.AllTests",
            vec![mixed_class().into(), simple("demo.Other", &["x"])],
        )
        .into();

        let caller = thread::current().id();
        let mut seen = Vec::new();
        let run = executor
            .run(root, &CancellationToken::new(), |p| {
                assert_eq!(thread::current().id(), caller);
                seen.push(p.processed);
            })
            .unwrap();

        assert_eq!(seen, vec![1, 2, 3, 4]);
        assert_eq!(run.root, "demo.AllTests");
        assert!(!run.is_cancelled());
        let classes: Vec<&str> = run.results.keys().map(String::as_str).collect();
        assert_eq!(classes, vec!["demo.MathTests", "demo.Other"]);
        assert_eq!(run.results["demo.MathTests"].len(), 3);
        let summary = run.summary();
        assert_eq!((summary.passed, summary.failed, summary.ignored), (2, 1, 1));
    }

    #[test]
    fn run_surfaces_resolution_error() {
        let executor = TestExecutor::new(Arc::new(ScriptedRunner::new()));
        let root: Declaration =
            CompositeSuite::new("demo.Broken", || -> Result<Vec<Declaration>, SuiteError> {
                Err(SuiteError::new("boom"))
            })
            .into();
        let err = executor
            .run(root, &CancellationToken::new(), |_| {})
            .unwrap_err();
        assert!(matches!(err, RunError::Resolution(_)));
    }
}
