//! JUnit XML report for a completed run.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::runner::aggregator::ResultsByClass;
use crate::runner::result::{FailureRecord, TestResult};

static TESTSUITES_TAG: &str = "testsuites";
static TESTSUITE_TAG: &str = "testsuite";
static TESTCASE_TAG: &str = "testcase";
static FAILURE_TAG: &str = "failure";
static ERROR_TAG: &str = "error";
static SKIPPED_TAG: &str = "skipped";

/// Errors from writing a report file.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to create report directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write report {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Conventional report file name for a root declaration.
pub fn report_file_name(declaration: &str) -> String {
    let safe: String = declaration
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    format!("TEST-{safe}.xml")
}

/// Counters written on `testsuite` and `testsuites` elements.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct SuiteStats {
    tests: usize,
    skipped: usize,
    errors: usize,
    millis: u64,
}

impl SuiteStats {
    fn over<'a>(results: impl IntoIterator<Item = &'a TestResult>) -> Self {
        let mut stats = Self::default();
        for result in results {
            stats.tests += 1;
            stats.millis = stats.millis.saturating_add(result.duration_millis());
            if result.is_ignored() {
                stats.skipped += 1;
            }
            if result.has_failures() {
                stats.errors += 1;
            }
        }
        stats
    }

    fn push_attributes(&self, tag: &mut BytesStart<'_>) {
        tag.push_attribute(("tests", self.tests.to_string().as_str()));
        tag.push_attribute(("skipped", self.skipped.to_string().as_str()));
        // Every failed case is counted under `errors`; `failures` stays 0.
        tag.push_attribute(("failures", "0"));
        tag.push_attribute(("errors", self.errors.to_string().as_str()));
        tag.push_attribute(("time", format_seconds(self.millis).as_str()));
    }
}

fn format_seconds(millis: u64) -> String {
    format!("{:.3}", millis as f64 / 1000.0)
}

/// Serialize `results` as JUnit XML: one `testsuite` per class, in order,
/// one `testcase` per result, in run order.
///
/// Suite time is the sum of its cases' durations.
///
/// # Errors
///
/// Returns any I/O error from `sink`.
pub fn write_report(sink: impl Write, results: &ResultsByClass) -> io::Result<()> {
    let mut writer = Writer::new_with_indent(sink, b' ', 4);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new(TESTSUITES_TAG);
    SuiteStats::over(results.values().flatten()).push_attributes(&mut root);
    writer.write_event(Event::Start(root))?;

    for (class, cases) in results {
        write_suite(&mut writer, class, cases)?;
    }

    writer.write_event(Event::End(BytesEnd::new(TESTSUITES_TAG)))?;
    writer.get_mut().write_all(b"\n")?;
    Ok(())
}

fn write_suite<W: Write>(
    writer: &mut Writer<W>,
    class: &str,
    cases: &[TestResult],
) -> io::Result<()> {
    tracing::debug!(suite = class, cases = cases.len(), "writing test suite");

    let mut tag = BytesStart::new(TESTSUITE_TAG);
    tag.push_attribute(("name", class));
    SuiteStats::over(cases).push_attributes(&mut tag);
    writer.write_event(Event::Start(tag))?;

    for case in cases {
        write_case(writer, case)?;
    }

    writer.write_event(Event::End(BytesEnd::new(TESTSUITE_TAG)))
}

fn write_case<W: Write>(writer: &mut Writer<W>, result: &TestResult) -> io::Result<()> {
    let mut tag = BytesStart::new(TESTCASE_TAG);
    tag.push_attribute(("name", result.identity.method_name.as_str()));
    tag.push_attribute(("classname", result.identity.class_name.as_str()));
    tag.push_attribute(("time", format_seconds(result.duration_millis()).as_str()));

    if !result.is_ignored() && !result.has_failures() {
        return writer.write_event(Event::Empty(tag));
    }
    writer.write_event(Event::Start(tag))?;

    if let Some(reason) = &result.ignored_reason {
        let mut skipped = BytesStart::new(SKIPPED_TAG);
        if !reason.is_empty() {
            skipped.push_attribute(("message", reason.as_str()));
        }
        writer.write_event(Event::Empty(skipped))?;
    }
    for failure in &result.failures {
        write_failure(writer, failure)?;
    }

    writer.write_event(Event::End(BytesEnd::new(TESTCASE_TAG)))
}

/// `error` for exception-style faults, `failure` for assertion-style ones.
fn write_failure<W: Write>(writer: &mut Writer<W>, failure: &FailureRecord) -> io::Result<()> {
    let name = if failure.is_exception() { ERROR_TAG } else { FAILURE_TAG };
    let mut tag = BytesStart::new(name);
    tag.push_attribute(("message", failure.message.as_str()));
    if let Some(ty) = &failure.exception_type {
        tag.push_attribute(("type", ty.as_str()));
    }

    if failure.trace.is_empty() {
        return writer.write_event(Event::Empty(tag));
    }
    writer.write_event(Event::Start(tag))?;
    writer.write_event(Event::Text(BytesText::new(&failure.trace)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))
}

/// Serialize `results` to a string.
pub fn report_to_string(results: &ResultsByClass) -> String {
    let mut buf = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = write_report(&mut buf, results);
    String::from_utf8_lossy(&buf).into_owned()
}

/// Write the report for `declaration` to `dir/TEST-<declaration>.xml`.
///
/// The document is written to a temporary file in `dir` and renamed into
/// place, so a failed write never leaves a partial report behind.
///
/// # Errors
///
/// Returns [`ReportError`] if the directory cannot be created or the file
/// cannot be written.
pub fn write_report_file(
    dir: &Path,
    declaration: &str,
    results: &ResultsByClass,
) -> Result<PathBuf, ReportError> {
    fs::create_dir_all(dir).map_err(|source| ReportError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let path = dir.join(report_file_name(declaration));
    let write_err = |source| ReportError::Write {
        path: path.clone(),
        source,
    };

    let mut file = NamedTempFile::new_in(dir).map_err(write_err)?;
    {
        let mut out = BufWriter::new(file.as_file_mut());
        write_report(&mut out, results).map_err(write_err)?;
        out.flush().map_err(write_err)?;
    }
    file.as_file().sync_all().map_err(write_err)?;
    file.persist(&path).map_err(|e| write_err(e.error))?;

    tracing::info!(path = %path.display(), "wrote JUnit report");
    Ok(path)
}
