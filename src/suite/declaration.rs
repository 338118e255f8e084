use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::runner::result::{Annotation, TestIdentity};

/// One test case inside a leaf-bearing declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseDecl {
    pub name: String,
    /// Command a shell-based runner executes for this case.
    pub command: Option<String>,
    pub annotations: Vec<Annotation>,
}

impl CaseDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: None,
            annotations: Vec::new(),
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn ignored(mut self, reason: impl Into<String>) -> Self {
        self.annotations.push(Annotation::Ignore(reason.into()));
        self
    }

    pub fn tagged(mut self, tag: impl Into<String>) -> Self {
        self.annotations.push(Annotation::Tag(tag.into()));
        self
    }
}

/// A leaf-bearing declaration: a named class with its own test cases.
///
/// The class is handed to a [`LeafRunner`](crate::runner::backend::LeafRunner)
/// as a whole; the runner enumerates the cases itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestClass {
    pub name: String,
    pub cases: Vec<CaseDecl>,
}

impl TestClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cases: Vec::new(),
        }
    }

    pub fn with_case(mut self, case: CaseDecl) -> Self {
        self.cases.push(case);
        self
    }

    /// Build the identity a runner reports for one of this class's cases.
    pub fn identity(&self, case: &CaseDecl) -> TestIdentity {
        TestIdentity {
            class_name: self.name.clone(),
            method_name: case.name.clone(),
            annotations: case.annotations.clone(),
        }
    }
}

/// Error raised by a composite suite's factory.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct SuiteError {
    pub message: String,
}

impl SuiteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Produces the child declarations of a composite suite.
///
/// Implementations must return the same children in the same order on every
/// call: the leaf count and the execution walk each invoke the factory.
pub trait SuiteFactory: Send + Sync {
    /// # Errors
    ///
    /// Returns [`SuiteError`] if the children cannot be produced. This aborts
    /// the whole run.
    fn suite(&self) -> Result<Vec<Declaration>, SuiteError>;
}

impl<F> SuiteFactory for F
where
    F: Fn() -> Result<Vec<Declaration>, SuiteError> + Send + Sync,
{
    fn suite(&self) -> Result<Vec<Declaration>, SuiteError> {
        self()
    }
}

/// Fixed list of children.
struct StaticSuite(Vec<Declaration>);

impl SuiteFactory for StaticSuite {
    fn suite(&self) -> Result<Vec<Declaration>, SuiteError> {
        Ok(self.0.clone())
    }
}

/// A declaration that expands into child declarations.
#[derive(Clone)]
pub struct CompositeSuite {
    name: String,
    factory: Arc<dyn SuiteFactory>,
}

impl CompositeSuite {
    pub fn new(name: impl Into<String>, factory: impl SuiteFactory + 'static) -> Self {
        Self::from_shared(name, Arc::new(factory))
    }

    pub fn from_shared(name: impl Into<String>, factory: Arc<dyn SuiteFactory>) -> Self {
        Self {
            name: name.into(),
            factory,
        }
    }

    /// A composite whose children are known up front.
    pub fn with_children(name: impl Into<String>, children: Vec<Declaration>) -> Self {
        Self::new(name, StaticSuite(children))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the factory.
    ///
    /// # Errors
    ///
    /// Propagates the factory's [`SuiteError`].
    pub fn children(&self) -> Result<Vec<Declaration>, SuiteError> {
        self.factory.suite()
    }
}

impl fmt::Debug for CompositeSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeSuite")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A test declaration: either a composite suite or a leaf-bearing class.
#[derive(Debug, Clone)]
pub enum Declaration {
    Composite(CompositeSuite),
    LeafBearing(TestClass),
}

impl Declaration {
    pub fn name(&self) -> &str {
        match self {
            Self::Composite(suite) => suite.name(),
            Self::LeafBearing(class) => &class.name,
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Composite(_))
    }
}

impl From<TestClass> for Declaration {
    fn from(class: TestClass) -> Self {
        Self::LeafBearing(class)
    }
}

impl From<CompositeSuite> for Declaration {
    fn from(suite: CompositeSuite) -> Self {
        Self::Composite(suite)
    }
}
