use indexmap::IndexMap;

use crate::runner::result::{TestResult, TestStatus};

/// Results grouped by declaring class, in first-seen class order.
pub type ResultsByClass = IndexMap<String, Vec<TestResult>>;

/// Collects leaf results as a run progresses.
///
/// Has a single writer: the consumer of one run's progress messages.
#[derive(Debug, Clone, Default)]
pub struct ResultAggregator {
    results: ResultsByClass,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `result` under its class, creating the class group on first use.
    pub fn record(&mut self, result: TestResult) {
        self.results
            .entry(result.identity.class_name.clone())
            .or_default()
            .push(result);
    }

    pub fn snapshot(&self) -> &ResultsByClass {
        &self.results
    }

    pub fn into_results(self) -> ResultsByClass {
        self.results
    }

    pub fn clear(&mut self) {
        self.results.clear();
    }

    pub fn class_count(&self) -> usize {
        self.results.len()
    }

    pub fn result_count(&self) -> usize {
        self.results.values().map(Vec::len).sum()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary::from_results(&self.results)
    }
}

/// Summary statistics over a set of results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub ignored: usize,
}

impl RunSummary {
    /// Whether no recorded leaf failed.
    pub fn success(&self) -> bool {
        self.failed == 0
    }

    pub fn from_results(results: &ResultsByClass) -> Self {
        let mut summary = Self::default();
        for result in results.values().flatten() {
            summary.total += 1;
            match result.status() {
                TestStatus::Passed => summary.passed += 1,
                TestStatus::Failed => summary.failed += 1,
                TestStatus::Ignored => summary.ignored += 1,
                TestStatus::Running => {}
            }
        }
        summary
    }
}
