use crate::runner::executor::{CompletedRun, Progress};
use crate::runner::result::{TestResult, TestStatus};

/// Format a status label for terminal output.
fn status_label(status: TestStatus) -> &'static str {
    match status {
        TestStatus::Running => "RUNNING",
        TestStatus::Passed => "PASSED",
        TestStatus::Failed => "FAILED",
        TestStatus::Ignored => "IGNORED",
    }
}

/// Format the run header line.
pub fn format_run_header(root: &str, total: usize, runner: &str) -> String {
    format!("Running {root} ({total} tests, {runner} runner)...\n")
}

/// Format a leaf result as it completes, with its position in the run.
pub fn format_progress(progress: &Progress) -> String {
    format!(
        "  [{}/{}] {}",
        progress.processed,
        progress.total,
        format_result(&progress.result)
    )
}

/// Format a single result: status, identity, duration and the first fault.
pub fn format_result(result: &TestResult) -> String {
    let status = result.status();
    let mut line = format!(
        "{} {} ({:.3}s)",
        status_label(status),
        result.identity,
        result.duration.as_secs_f64()
    );

    if let Some(failure) = result.failures.first() {
        line.push_str(&format!("\n         → {}", failure.message));
        if result.failures.len() > 1 {
            line.push_str(&format!(" (+{} more)", result.failures.len() - 1));
        }
    }

    if let Some(reason) = result.ignored_reason.as_deref()
        && !reason.is_empty()
    {
        line.push_str(&format!("\n         → ignored: {reason}"));
    }

    line
}

/// Format the final summary after the run ends.
pub fn format_summary(run: &CompletedRun) -> String {
    let summary = run.summary();
    let mut parts = Vec::new();

    if summary.passed > 0 {
        parts.push(format!("{} passed", summary.passed));
    }
    if summary.failed > 0 {
        parts.push(format!("{} failed", summary.failed));
    }
    if summary.ignored > 0 {
        parts.push(format!("{} ignored", summary.ignored));
    }
    if parts.is_empty() {
        parts.push("0 tests".into());
    }

    let mut line = format!(
        "\nResults: {} ({:.1}s)",
        parts.join(", "),
        run.stats.elapsed.as_secs_f64()
    );
    if run.is_cancelled() {
        line.push_str(&format!(
            "\nCancelled after {} of {} tests",
            run.stats.processed, run.stats.total
        ));
    }
    line
}
