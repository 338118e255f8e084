use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::runner::backend::{LeafRunner, RunListener};
use crate::runner::result::{FailureRecord, TestIdentity};
use crate::suite::declaration::{CaseDecl, TestClass};

/// Environment variable carrying the declaring class of the running case.
pub const CLASS_ENV_VAR: &str = "LEAFSUITE_CLASS";
/// Environment variable carrying the name of the running case.
pub const CASE_ENV_VAR: &str = "LEAFSUITE_CASE";

/// Leaf runner that executes each case's command through a shell.
///
/// Exit code 0 passes, any other exit code is an assertion-style failure,
/// and a command that cannot be spawned or dies from a signal is an error.
pub struct ShellRunner {
    /// Shell interpreter (default: "/bin/sh").
    pub shell: String,
    /// Flags passed before the command string (default: ["-c"]).
    pub shell_args: Vec<String>,
    /// Directory commands run in.
    pub working_dir: PathBuf,
    stop: AtomicBool,
}

impl ShellRunner {
    /// Create a new shell runner with default settings.
    pub fn new() -> Self {
        Self {
            shell: "/bin/sh".to_string(),
            shell_args: vec!["-c".to_string()],
            working_dir: PathBuf::from("."),
            stop: AtomicBool::new(false),
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Run one command, returning the fault it produced, if any.
    fn run_command(&self, command: &str, identity: &TestIdentity) -> Option<FailureRecord> {
        let output = Command::new(&self.shell)
            .args(&self.shell_args)
            .arg(command)
            .current_dir(&self.working_dir)
            .env(CLASS_ENV_VAR, &identity.class_name)
            .env(CASE_ENV_VAR, &identity.method_name)
            .output();

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                return Some(FailureRecord::exception(
                    "std::io::Error",
                    format!("failed to execute {}: {e}", self.shell),
                    format!("{e:?}"),
                ));
            }
        };

        if output.status.success() {
            return None;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let trace = format_trace(command, &stdout, &stderr);

        match output.status.code() {
            Some(code) => {
                let message = last_line(&stderr)
                    .map(str::to_owned)
                    .unwrap_or_else(|| format!("command exited with code {code}"));
                Some(FailureRecord::assertion(message, trace))
            }
            None => Some(FailureRecord::exception(
                "Signal",
                format!("command terminated by signal ({})", output.status),
                trace,
            )),
        }
    }

    fn run_case(&self, class: &TestClass, case: &CaseDecl, listener: &mut dyn RunListener) {
        let identity = class.identity(case);
        if identity.ignore_reason().is_some() {
            listener.test_ignored(&identity);
            return;
        }

        listener.test_started(&identity);
        if let Some(command) = &case.command
            && let Some(failure) = self.run_command(command, &identity)
        {
            listener.test_failure(&identity, failure);
        }
        listener.test_finished(&identity);
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl LeafRunner for ShellRunner {
    fn name(&self) -> &str {
        "shell"
    }

    fn leaf_count(&self, class: &TestClass) -> usize {
        class.cases.len()
    }

    fn execute(&self, class: &TestClass, listener: &mut dyn RunListener) {
        self.stop.store(false, Ordering::SeqCst);
        for case in &class.cases {
            if self.stop.load(Ordering::SeqCst) {
                tracing::debug!(
                    class = %class.name,
                    case = %case.name,
                    "stop requested, skipping remaining cases"
                );
                break;
            }
            self.run_case(class, case, listener);
        }
    }

    fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).rfind(|line| !line.is_empty())
}

fn format_trace(command: &str, stdout: &str, stderr: &str) -> String {
    let mut trace = format!("$ {command}\n");
    if !stdout.is_empty() {
        trace.push_str("--- stdout ---\n");
        trace.push_str(stdout);
        if !stdout.ends_with('\n') {
            trace.push('\n');
        }
    }
    if !stderr.is_empty() {
        trace.push_str("--- stderr ---\n");
        trace.push_str(stderr);
    }
    trace
}
