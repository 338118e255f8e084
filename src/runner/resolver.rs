use thiserror::Error;

use crate::runner::backend::LeafRunner;
use crate::suite::declaration::{Declaration, SuiteError, TestClass};
use crate::suite::registry::{DeclarationError, DeclarationRegistry};

/// Fatal errors raised while resolving a declaration tree.
#[derive(Debug, Clone, Error)]
pub enum ResolutionError {
    #[error(transparent)]
    Declaration(#[from] DeclarationError),
    #[error("suite \"{suite}\" failed to produce its tests: {source}")]
    Factory {
        suite: String,
        #[source]
        source: SuiteError,
    },
    #[error("suite cycle: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },
}

/// Load the root declaration of a run by name.
///
/// # Errors
///
/// Returns [`ResolutionError::Declaration`] if the name cannot be loaded.
pub fn load_root(
    registry: &DeclarationRegistry,
    name: &str,
) -> Result<Declaration, ResolutionError> {
    Ok(registry.load(name)?)
}

/// Flattens a declaration tree into the leaf-bearing classes a
/// [`LeafRunner`] executes.
///
/// Composites are expanded depth-first, pre-order, through their factory.
/// Counting and expansion share the same walk, so both see the same classes
/// in the same order.
pub struct SuiteResolver<'a> {
    runner: &'a dyn LeafRunner,
}

impl<'a> SuiteResolver<'a> {
    pub fn new(runner: &'a dyn LeafRunner) -> Self {
        Self { runner }
    }

    /// Total number of leaves under `root`, as reported by the runner.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError`] if any factory fails or a suite contains
    /// itself.
    pub fn count_leaves(&self, root: &Declaration) -> Result<usize, ResolutionError> {
        let mut total = 0;
        self.walk(root, &mut Vec::new(), &mut |class| {
            total += self.runner.leaf_count(class);
        })?;
        Ok(total)
    }

    /// Leaf-bearing classes under `root`, in execution order.
    ///
    /// # Errors
    ///
    /// Same as [`count_leaves`](Self::count_leaves).
    pub fn expand(&self, root: &Declaration) -> Result<Vec<TestClass>, ResolutionError> {
        let mut classes = Vec::new();
        self.walk(root, &mut Vec::new(), &mut |class| classes.push(class.clone()))?;
        Ok(classes)
    }

    fn walk(
        &self,
        decl: &Declaration,
        path: &mut Vec<String>,
        visit: &mut dyn FnMut(&TestClass),
    ) -> Result<(), ResolutionError> {
        let suite = match decl {
            Declaration::LeafBearing(class) => {
                visit(class);
                return Ok(());
            }
            Declaration::Composite(suite) => suite,
        };

        if path.iter().any(|name| name == suite.name()) {
            let mut cycle = path.clone();
            cycle.push(suite.name().to_owned());
            return Err(ResolutionError::Cycle { path: cycle });
        }

        let children = suite
            .children()
            .map_err(|source| ResolutionError::Factory {
                suite: suite.name().to_owned(),
                source,
            })?;
        tracing::trace!(suite = suite.name(), children = children.len(), "expanded suite");

        path.push(suite.name().to_owned());
        for child in &children {
            self.walk(child, path, visit)?;
        }
        path.pop();
        Ok(())
    }
}
