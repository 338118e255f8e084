use serde::{Deserialize, Serialize};

use crate::runner::executor::{CompletedRun, RunOutcome};
use crate::runner::result::TestResult;

/// Serializable run summary for emitter output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRunReport {
    pub run: RunMetadata,
    pub classes: Vec<ClassReport>,
    pub summary: SummaryReport,
}

/// Metadata about the run execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub root: String,
    pub outcome: String,
    pub total: usize,
    pub processed: usize,
    pub duration_ms: u64,
}

/// Results of one declaring class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassReport {
    pub name: String,
    pub cases: Vec<CaseReport>,
}

/// A single leaf's result in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseReport {
    pub name: String,
    pub status: String,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignored_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FailureReport>,
}

/// Failure detail in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureReport {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_type: Option<String>,
}

/// Summary statistics in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub ignored: usize,
    pub success: bool,
}

fn outcome_label(outcome: RunOutcome) -> &'static str {
    match outcome {
        RunOutcome::Completed => "completed",
        RunOutcome::Cancelled => "cancelled",
    }
}

fn case_report(result: &TestResult) -> CaseReport {
    CaseReport {
        name: result.identity.method_name.clone(),
        status: result.status().to_string(),
        duration_ms: result.duration_millis(),
        ignored_reason: result.ignored_reason.clone(),
        failures: result
            .failures
            .iter()
            .map(|f| FailureReport {
                message: f.message.clone(),
                exception_type: f.exception_type.clone(),
            })
            .collect(),
    }
}

/// Convert a [`CompletedRun`] into a serializable [`TestRunReport`].
pub fn to_report(run: &CompletedRun) -> TestRunReport {
    let summary = run.summary();
    TestRunReport {
        run: RunMetadata {
            root: run.root.clone(),
            outcome: outcome_label(run.stats.outcome).to_owned(),
            total: run.stats.total,
            processed: run.stats.processed,
            duration_ms: u64::try_from(run.stats.elapsed.as_millis()).unwrap_or(u64::MAX),
        },
        classes: run
            .results
            .iter()
            .map(|(name, results)| ClassReport {
                name: name.clone(),
                cases: results.iter().map(case_report).collect(),
            })
            .collect(),
        summary: SummaryReport {
            total: summary.total,
            passed: summary.passed,
            failed: summary.failed,
            ignored: summary.ignored,
            success: summary.success() && run.stats.outcome == RunOutcome::Completed,
        },
    }
}
