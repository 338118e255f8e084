use crate::runner::result::{FailureRecord, TestIdentity};
use crate::suite::declaration::TestClass;

/// Receives lifecycle events for the leaves of one class.
///
/// For each leaf a runner emits `test_started`, then zero or more
/// `test_failure`, then `test_finished`; or a single `test_ignored` instead
/// of all three. Events for one leaf are never interleaved with another's.
pub trait RunListener {
    fn test_started(&mut self, identity: &TestIdentity);
    fn test_ignored(&mut self, identity: &TestIdentity);
    fn test_failure(&mut self, identity: &TestIdentity, failure: FailureRecord);
    fn test_finished(&mut self, identity: &TestIdentity);
}

/// Trait implemented by every leaf runner.
///
/// A leaf runner owns the execution of a leaf-bearing class: it knows how
/// many leaves the class holds and runs them in order, reporting through a
/// [`RunListener`]. Per-leaf faults are reported as events, never returned.
pub trait LeafRunner: Send + Sync {
    /// Human-readable runner name (e.g., "shell").
    fn name(&self) -> &str;

    /// Number of leaves [`execute`](Self::execute) will report for `class`,
    /// ignored leaves included.
    fn leaf_count(&self, class: &TestClass) -> usize;

    /// Run every leaf of `class`, blocking until done or stopped.
    fn execute(&self, class: &TestClass, listener: &mut dyn RunListener);

    /// Ask the current [`execute`](Self::execute) call to stop before its next
    /// leaf. The leaf in flight is allowed to complete.
    fn request_stop(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::test_runners::{RecordingListener, ScriptedRunner};
    use crate::suite::declaration::CaseDecl;

    fn class() -> TestClass {
        TestClass::new("demo.Tests")
            .with_case(CaseDecl::new("passes"))
            .with_case(CaseDecl::new("fails").with_command("fail:boom"))
            .with_case(CaseDecl::new("skipped").ignored("flaky"))
    }

    #[test]
    fn scripted_runner_counts_every_case() {
        let runner = ScriptedRunner::new();
        assert_eq!(runner.leaf_count(&class()), 3);
        assert_eq!(runner.name(), "scripted");
    }

    #[test]
    fn scripted_runner_emits_protocol_events() {
        let runner = ScriptedRunner::new();
        let mut listener = RecordingListener::default();
        runner.execute(&class(), &mut listener);
        assert_eq!(
            listener.events,
            vec![
                "started demo.Tests::passes",
                "finished demo.Tests::passes",
                "started demo.Tests::fails",
                "failure demo.Tests::fails boom",
                "finished demo.Tests::fails",
                "ignored demo.Tests::skipped",
            ]
        );
    }

    #[test]
    fn stop_request_halts_before_next_case() {
        let runner = ScriptedRunner::new();
        let class = TestClass::new("demo.Tests")
            .with_case(CaseDecl::new("first").with_command("stop"))
            .with_case(CaseDecl::new("second"));
        let mut listener = RecordingListener::default();
        runner.execute(&class, &mut listener);
        assert_eq!(
            listener.events,
            vec!["started demo.Tests::first", "finished demo.Tests::first"]
        );
    }
}
