use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;

use crate::suite::declaration::{CaseDecl, TestClass};
use crate::suite::registry::DeclarationRegistry;

/// Root name used when neither an explicit name nor manifest metadata is given.
pub const DEFAULT_ROOT_NAME: &str = "AllTests";

/// A YAML file declaring test classes and composite suites.
///
/// ```yaml
/// package: demo
/// classes:
///   demo.AllTests:
///     suite: [demo.MathTests]
///   demo.MathTests:
///     cases:
///       - name: adds
///         run: test $((1 + 1)) -eq 2
///       - name: divides
///         ignore: not implemented
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub package: Option<String>,
    #[serde(default)]
    pub root: Option<String>,
    #[serde(default)]
    pub classes: IndexMap<String, ClassEntry>,
}

/// A class is either a composite (`suite`) or leaf-bearing (`cases`).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassEntry {
    #[serde(default)]
    pub suite: Option<Vec<String>>,
    #[serde(default)]
    pub cases: Option<Vec<CaseEntry>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaseEntry {
    pub name: String,
    #[serde(default)]
    pub run: Option<String>,
    #[serde(default)]
    pub ignore: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid manifest: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("class \"{class}\": {reason}")]
    Invalid { class: String, reason: String },
}

impl Manifest {
    /// Read and parse a manifest file.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] if the file cannot be read or parsed.
    pub fn from_path(path: &Path) -> Result<Self, ManifestError> {
        let input = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&input)
    }

    /// # Errors
    ///
    /// Returns [`ManifestError::Parse`] for malformed YAML or unknown keys.
    pub fn parse(input: &str) -> Result<Self, ManifestError> {
        Ok(serde_yaml::from_str(input)?)
    }

    /// Pick the root declaration name.
    ///
    /// An explicit name wins, then the manifest's `root`, then
    /// `<package>.AllTests`, then plain `AllTests`.
    pub fn root_name(&self, explicit: Option<&str>) -> String {
        if let Some(name) = explicit {
            return name.to_owned();
        }
        if let Some(root) = &self.root {
            return root.clone();
        }
        match &self.package {
            Some(package) => format!("{package}.{DEFAULT_ROOT_NAME}"),
            None => DEFAULT_ROOT_NAME.to_owned(),
        }
    }

    /// Validate the manifest and build a registry from it.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Invalid`] for a class that is both or neither
    /// a suite and a case list, or a runnable case without a command.
    pub fn to_registry(&self) -> Result<DeclarationRegistry, ManifestError> {
        let mut registry = DeclarationRegistry::new();

        for (name, entry) in &self.classes {
            let invalid = |reason: &str| ManifestError::Invalid {
                class: name.clone(),
                reason: reason.to_owned(),
            };

            match (&entry.suite, &entry.cases) {
                (Some(children), None) => registry.register_suite(name.clone(), children.clone()),
                (None, Some(cases)) => {
                    let mut class = TestClass::new(name.clone());
                    for case in cases {
                        class = class.with_case(case_decl(name, case)?);
                    }
                    registry.register_class(class);
                }
                (Some(_), Some(_)) => return Err(invalid("declares both `suite` and `cases`")),
                (None, None) => return Err(invalid("declares neither `suite` nor `cases`")),
            }
        }

        Ok(registry)
    }
}

fn case_decl(class: &str, entry: &CaseEntry) -> Result<CaseDecl, ManifestError> {
    if entry.name.trim().is_empty() {
        return Err(ManifestError::Invalid {
            class: class.to_owned(),
            reason: "case with empty name".to_owned(),
        });
    }

    let mut case = CaseDecl::new(entry.name.clone());
    for tag in &entry.tags {
        case = case.tagged(tag.clone());
    }
    if let Some(run) = &entry.run {
        case = case.with_command(run.clone());
    }
    match &entry.ignore {
        Some(reason) => case = case.ignored(reason.clone()),
        None if entry.run.is_none() => {
            return Err(ManifestError::Invalid {
                class: class.to_owned(),
                reason: format!("case \"{}\" has no `run` command", entry.name),
            });
        }
        None => {}
    }
    Ok(case)
}
