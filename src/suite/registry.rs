use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;

use crate::suite::declaration::{CompositeSuite, Declaration, SuiteError, SuiteFactory, TestClass};

/// Errors from resolving a declaration name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeclarationError {
    #[error("declaration \"{0}\" not found")]
    NotFound(String),
    #[error("failed to load declaration \"{name}\": {reason}")]
    Load { name: String, reason: String },
}

#[derive(Clone)]
enum Entry {
    Suite(Vec<String>),
    Class(TestClass),
    Factory(Arc<dyn SuiteFactory>),
}

/// Registry of named test declarations.
///
/// Cloning is cheap; clones share the entries registered so far. Composite
/// suites registered by child names resolve those children lazily, through
/// their factory, against the registry they were loaded from.
#[derive(Clone, Default)]
pub struct DeclarationRegistry {
    entries: Arc<IndexMap<String, Entry>>,
}

impl DeclarationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a composite suite whose children are other registered names.
    pub fn register_suite(&mut self, name: impl Into<String>, children: Vec<String>) {
        self.insert(name.into(), Entry::Suite(children));
    }

    /// Register a leaf-bearing class under its own name.
    pub fn register_class(&mut self, class: TestClass) {
        self.insert(class.name.clone(), Entry::Class(class));
    }

    /// Register a composite suite backed by an arbitrary factory.
    pub fn register_factory(
        &mut self,
        name: impl Into<String>,
        factory: impl SuiteFactory + 'static,
    ) {
        self.insert(name.into(), Entry::Factory(Arc::new(factory)));
    }

    fn insert(&mut self, name: String, entry: Entry) {
        Arc::make_mut(&mut self.entries).insert(name, entry);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a name to a declaration.
    ///
    /// # Errors
    ///
    /// Returns [`DeclarationError::NotFound`] for an unknown name and
    /// [`DeclarationError::Load`] for a class whose case names collide.
    pub fn load(&self, name: &str) -> Result<Declaration, DeclarationError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| DeclarationError::NotFound(name.to_owned()))?;

        match entry {
            Entry::Suite(children) => Ok(Declaration::Composite(CompositeSuite::new(
                name,
                NamedSuite {
                    registry: self.clone(),
                    children: children.clone(),
                },
            ))),
            Entry::Class(class) => {
                check_case_names(class)?;
                Ok(Declaration::LeafBearing(class.clone()))
            }
            Entry::Factory(factory) => Ok(Declaration::Composite(CompositeSuite::from_shared(
                name,
                Arc::clone(factory),
            ))),
        }
    }
}

impl fmt::Debug for DeclarationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeclarationRegistry")
            .field("names", &self.names())
            .finish()
    }
}

fn check_case_names(class: &TestClass) -> Result<(), DeclarationError> {
    let mut seen = HashSet::new();
    for case in &class.cases {
        if !seen.insert(case.name.as_str()) {
            return Err(DeclarationError::Load {
                name: class.name.clone(),
                reason: format!("duplicate case \"{}\"", case.name),
            });
        }
    }
    Ok(())
}

/// Factory for a suite registered by child names.
struct NamedSuite {
    registry: DeclarationRegistry,
    children: Vec<String>,
}

impl SuiteFactory for NamedSuite {
    fn suite(&self) -> Result<Vec<Declaration>, SuiteError> {
        self.children
            .iter()
            .map(|child| {
                self.registry
                    .load(child)
                    .map_err(|e| SuiteError::new(e.to_string()))
            })
            .collect()
    }
}
