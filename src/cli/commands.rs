use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::emit::junit::{ReportError, write_report_file};
use crate::emit::run_result::{emit_run_json, emit_run_yaml};
use crate::runner::backend::LeafRunner;
use crate::runner::backends::shell::ShellRunner;
use crate::runner::display::{format_progress, format_run_header, format_summary};
use crate::runner::executor::{CancellationToken, CompletedRun, RunError, RunMessage, TestExecutor};
use crate::runner::report::to_report;
use crate::runner::resolver::{ResolutionError, SuiteResolver, load_root};
use crate::suite::declaration::Declaration;
use crate::suite::manifest::{Manifest, ManifestError};

/// Errors that stop a command before it produces results.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Run(#[from] RunError),
    #[error("{0}")]
    Usage(String),
}

/// How the end-of-run summary is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryFormat {
    Text,
    Json,
    Yaml,
}

impl SummaryFormat {
    /// # Errors
    ///
    /// Returns [`CliError::Usage`] for an unknown format name.
    pub fn parse(name: &str) -> Result<Self, CliError> {
        match name {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "yaml" => Ok(Self::Yaml),
            other => Err(CliError::Usage(format!(
                "unknown format '{other}' (expected: text, json, yaml)"
            ))),
        }
    }
}

/// Options for the `run` command.
pub struct RunOptions {
    pub manifest: PathBuf,
    pub test_class: Option<String>,
    /// Directory for the JUnit report; no report is written when unset.
    pub report_dir: Option<PathBuf>,
    pub format: String,
    pub fail_fast: bool,
    pub shell: Option<String>,
    /// Write the report even when the run was cancelled.
    pub report_cancelled: bool,
}

impl RunOptions {
    pub fn new(manifest: impl Into<PathBuf>) -> Self {
        Self {
            manifest: manifest.into(),
            test_class: None,
            report_dir: None,
            format: "text".to_owned(),
            fail_fast: false,
            shell: None,
            report_cancelled: false,
        }
    }
}

/// Process exit status of a finished `run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success = 0,
    Failures = 1,
    Cancelled = 2,
    Error = 3,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Everything the `run` command produced.
///
/// A report failure leaves `run` untouched so the results can still be shown.
#[derive(Debug)]
pub struct RunOutput {
    pub run: CompletedRun,
    /// Rendered summary in the requested format.
    pub summary: String,
    pub report_path: Option<PathBuf>,
    pub report_error: Option<ReportError>,
}

impl RunOutput {
    pub fn exit_status(&self) -> ExitStatus {
        if self.report_error.is_some() {
            ExitStatus::Error
        } else if self.run.is_cancelled() {
            ExitStatus::Cancelled
        } else if self.run.summary().success() {
            ExitStatus::Success
        } else {
            ExitStatus::Failures
        }
    }
}

/// Loaded manifest plus the root declaration picked from it.
struct Loaded {
    root: Declaration,
    base_dir: PathBuf,
}

fn load(manifest_path: &Path, test_class: Option<&str>) -> Result<Loaded, CliError> {
    let manifest = Manifest::from_path(manifest_path)?;
    let registry = manifest.to_registry()?;
    let root_name = manifest.root_name(test_class);
    tracing::debug!(root = %root_name, classes = registry.len(), "loaded manifest");
    let root = load_root(&registry, &root_name)?;

    let base_dir = match manifest_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok(Loaded { root, base_dir })
}

fn shell_runner(base_dir: PathBuf, shell: Option<&str>) -> ShellRunner {
    let runner = ShellRunner::new().with_working_dir(base_dir);
    match shell {
        Some(shell) => runner.with_shell(shell),
        None => runner,
    }
}

/// Run the `run` command: resolve the root, execute every leaf and write
/// the report.
///
/// Progress lines (header and one line per leaf) go to `on_line` as the run
/// advances.
///
/// # Errors
///
/// Returns [`CliError`] if the manifest is invalid or the tree cannot be
/// resolved. Report failures are carried in [`RunOutput::report_error`].
pub fn run_run(options: &RunOptions, mut on_line: impl FnMut(&str)) -> Result<RunOutput, CliError> {
    let format = SummaryFormat::parse(&options.format)?;
    let loaded = load(&options.manifest, options.test_class.as_deref())?;
    let runner = Arc::new(shell_runner(loaded.base_dir, options.shell.as_deref()));
    let runner_name = runner.name().to_owned();
    let executor = TestExecutor::new(runner);
    let token = CancellationToken::new();
    let root_name = loaded.root.name().to_owned();

    let run = executor
        .spawn(loaded.root, token.clone())?
        .wait(|message| match message {
            RunMessage::Resolved { total, .. } => {
                on_line(format_run_header(&root_name, *total, &runner_name).trim_end());
            }
            RunMessage::Progress(progress) => {
                on_line(&format_progress(progress));
                if options.fail_fast && progress.result.has_failures() && !token.is_cancelled() {
                    tracing::info!(test = %progress.result.identity, "fail-fast: cancelling run");
                    token.cancel();
                }
            }
        })?;

    let summary = match format {
        SummaryFormat::Text => format_summary(&run),
        SummaryFormat::Json => emit_run_json(&to_report(&run)),
        SummaryFormat::Yaml => emit_run_yaml(&to_report(&run)),
    };

    let mut report_path = None;
    let mut report_error = None;
    if let Some(dir) = &options.report_dir {
        if run.is_cancelled() && !options.report_cancelled {
            tracing::warn!(root = %run.root, "run cancelled, skipping report");
        } else {
            match write_report_file(dir, &run.root, &run.results) {
                Ok(path) => report_path = Some(path),
                Err(e) => {
                    tracing::error!(error = %e, "report not written");
                    report_error = Some(e);
                }
            }
        }
    }

    Ok(RunOutput {
        run,
        summary,
        report_path,
        report_error,
    })
}

/// Run the `count` command: report the number of leaves under the root.
///
/// # Errors
///
/// Returns [`CliError`] if the manifest is invalid or the tree cannot be
/// resolved.
pub fn run_count(manifest: &Path, test_class: Option<&str>) -> Result<String, CliError> {
    let loaded = load(manifest, test_class)?;
    let runner = shell_runner(loaded.base_dir, None);
    let total = SuiteResolver::new(&runner).count_leaves(&loaded.root)?;
    Ok(format!("{}: {total} tests", loaded.root.name()))
}

/// Run the `list` command: print every leaf under the root in run order.
///
/// # Errors
///
/// Returns [`CliError`] if the manifest is invalid or the tree cannot be
/// resolved.
pub fn run_list(manifest: &Path, test_class: Option<&str>) -> Result<String, CliError> {
    let loaded = load(manifest, test_class)?;
    let runner = shell_runner(loaded.base_dir, None);
    let classes = SuiteResolver::new(&runner).expand(&loaded.root)?;

    let mut lines = Vec::new();
    for class in &classes {
        for case in &class.cases {
            let identity = class.identity(case);
            let mut line = identity.to_string();
            let tags: Vec<&str> = identity.tags().collect();
            if !tags.is_empty() {
                line.push_str(&format!(" [{}]", tags.join(", ")));
            }
            if let Some(reason) = identity.ignore_reason() {
                line.push_str(&format!(" (ignored: {reason})"));
            }
            lines.push(line);
        }
    }

    Ok(lines.join("\n") + "\n")
}
