use crate::runner::report::TestRunReport;

/// Emit a run summary as YAML.
pub fn emit_run_yaml(report: &TestRunReport) -> String {
    serde_yaml::to_string(report)
        .unwrap_or_else(|e| format!("# failed to serialize run summary: {e}\n"))
}

/// Emit a run summary as JSON.
pub fn emit_run_json(report: &TestRunReport) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|e| json_error(&e))
}

/// A JSON object carrying the serialization error, so the output still parses.
fn json_error(error: &dyn std::fmt::Display) -> String {
    serde_json::json!({ "error": format!("failed to serialize run summary: {error}") }).to_string()
}
