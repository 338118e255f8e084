use std::fmt;
use std::time::Duration;

/// Metadata attached to a test case by its declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation {
    /// The case is skipped; the string is the (possibly empty) reason.
    Ignore(String),
    /// Free-form tag carried through to the identity.
    Tag(String),
}

/// Identity of a single leaf test: declaring class, case name, annotations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestIdentity {
    pub class_name: String,
    pub method_name: String,
    pub annotations: Vec<Annotation>,
}

impl TestIdentity {
    pub fn new(class_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: method_name.into(),
            annotations: Vec::new(),
        }
    }

    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// The reason from an `Ignore` annotation, if the identity carries one.
    ///
    /// The last `Ignore` annotation wins when several are present.
    pub fn ignore_reason(&self) -> Option<&str> {
        self.annotations.iter().rev().find_map(|a| match a {
            Annotation::Ignore(reason) => Some(reason.as_str()),
            Annotation::Tag(_) => None,
        })
    }

    /// Tags in declaration order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.annotations.iter().filter_map(|a| match a {
            Annotation::Tag(tag) => Some(tag.as_str()),
            Annotation::Ignore(_) => None,
        })
    }
}

impl fmt::Display for TestIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.class_name, self.method_name)
    }
}

/// One recorded fault for a leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub message: String,
    /// Set when the fault was an unexpected error rather than a failed assertion.
    pub exception_type: Option<String>,
    pub trace: String,
}

impl FailureRecord {
    /// An assertion-style failure.
    pub fn assertion(message: impl Into<String>, trace: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            exception_type: None,
            trace: trace.into(),
        }
    }

    /// An error raised by the test rather than a failed check.
    pub fn exception(
        exception_type: impl Into<String>,
        message: impl Into<String>,
        trace: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            exception_type: Some(exception_type.into()),
            trace: trace.into(),
        }
    }

    pub fn is_exception(&self) -> bool {
        self.exception_type.is_some()
    }
}

/// Terminal classification of a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStatus {
    /// `started` seen, terminal event not yet observed.
    Running,
    Passed,
    Failed,
    Ignored,
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
            Self::Ignored => write!(f, "ignored"),
        }
    }
}

/// The result of one leaf test, built up while its events arrive.
///
/// Ignored results never have `finished` set, which keeps ignored, passed and
/// failed mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    pub identity: TestIdentity,
    /// Run-wide leaf count known when this leaf began.
    pub total_leaf_count: usize,
    pub failures: Vec<FailureRecord>,
    pub ignored_reason: Option<String>,
    pub finished: bool,
    pub duration: Duration,
}

impl TestResult {
    /// A result for a leaf that has just started.
    pub fn started(identity: TestIdentity, total_leaf_count: usize) -> Self {
        Self {
            identity,
            total_leaf_count,
            failures: Vec::new(),
            ignored_reason: None,
            finished: false,
            duration: Duration::ZERO,
        }
    }

    /// A terminal result for a skipped leaf.
    pub fn ignored(
        identity: TestIdentity,
        reason: impl Into<String>,
        total_leaf_count: usize,
    ) -> Self {
        Self {
            identity,
            total_leaf_count,
            failures: Vec::new(),
            ignored_reason: Some(reason.into()),
            finished: false,
            duration: Duration::ZERO,
        }
    }

    pub fn add_failure(&mut self, failure: FailureRecord) {
        self.failures.push(failure);
    }

    /// Mark the leaf finished. Has no effect on ignored results.
    pub fn finish(&mut self, duration: Duration) {
        if self.is_ignored() {
            return;
        }
        self.finished = true;
        self.duration = duration;
    }

    pub fn is_ignored(&self) -> bool {
        self.ignored_reason.is_some()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Whether any recorded failure is exception-style.
    pub fn has_errors(&self) -> bool {
        self.failures.iter().any(FailureRecord::is_exception)
    }

    pub fn is_terminal(&self) -> bool {
        self.finished || self.is_ignored()
    }

    pub fn status(&self) -> TestStatus {
        if self.is_ignored() {
            TestStatus::Ignored
        } else if !self.finished {
            TestStatus::Running
        } else if self.has_failures() {
            TestStatus::Failed
        } else {
            TestStatus::Passed
        }
    }

    pub fn duration_millis(&self) -> u64 {
        u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX)
    }
}
