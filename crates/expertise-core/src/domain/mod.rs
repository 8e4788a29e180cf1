pub mod errors;

pub use errors::{ExpertiseError, ExpertiseErrorCategory, ExpertiseResult};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

/// Declared resource kinds of reference artifacts.
pub mod resource_kind {
    /// A reference TaskSummary document.
    pub const TASKINFO: &str = "taskinfo";
    /// A reference run listing.
    pub const PLISTING: &str = "plisting";
    pub const HISTORIC: &str = "historic";
    pub const GRIDPOINT: &str = "gridpoint";
    pub const PGDFA: &str = "pgdfa";
    pub const INITIAL_CONDITION: &str = "initial_condition";

    pub const FIELD_CONTAINERS: [&str; 4] = [HISTORIC, GRIDPOINT, PGDFA, INITIAL_CONDITION];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Continuity,
    Consistency,
}

impl Scope {
    pub const ALL: [Scope; 2] = [Scope::Continuity, Scope::Consistency];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Continuity => "continuity",
            Self::Consistency => "consistency",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|scope| scope.as_str() == key)
    }
}

impl Display for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

/// A reference artifact staged in the working directory, with the resource
/// kind it was declared under upstream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReferenceArtifact {
    pub name: String,
    pub kind: String,
}

impl ReferenceArtifact {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
        }
    }

    pub fn has_kind(&self, kind: &str) -> bool {
        self.kind == kind
    }
}

/// Read-only listing of the files present in a task's working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
    entries: BTreeSet<String>,
}

impl Workspace {
    pub fn open(root: impl Into<PathBuf>) -> ExpertiseResult<Self> {
        let root = root.into();
        let listing = fs::read_dir(&root).map_err(|source| {
            ExpertiseError::io_system(
                "IO.WORKSPACE_LISTING",
                format!("failed to list working directory '{}': {}", root.display(), source),
            )
        })?;

        let mut entries = BTreeSet::new();
        for entry in listing {
            let entry = entry.map_err(|source| {
                ExpertiseError::io_system(
                    "IO.WORKSPACE_LISTING",
                    format!("failed to list working directory '{}': {}", root.display(), source),
                )
            })?;
            let is_file = entry.file_type().map(|kind| kind.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                entries.insert(name.to_string());
            }
        }

        Ok(Self { root, entries })
    }

    pub fn from_entries<I, S>(root: impl Into<PathBuf>, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            root: root.into(),
            entries: entries.into_iter().map(Into::into).collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains(name)
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn require(&self, name: &str, code: &'static str) -> ExpertiseResult<PathBuf> {
        if self.contains(name) {
            Ok(self.path(name))
        } else {
            Err(ExpertiseError::artifact_not_found(
                code,
                format!(
                    "artifact '{}' not found in working directory '{}'",
                    name,
                    self.root.display()
                ),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ExpertiseErrorCategory, ReferenceArtifact, Scope, Workspace};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn scope_keys_are_stable() {
        assert_eq!(Scope::Continuity.to_string(), "continuity");
        assert_eq!(Scope::from_key("consistency"), Some(Scope::Consistency));
        assert_eq!(Scope::from_key("itself"), None);
    }

    #[test]
    fn workspace_lists_files_only_in_sorted_order() {
        let temp = TempDir::new().expect("tempdir should be created");
        fs::write(temp.path().join("stdeo.1"), "x").expect("file should be written");
        fs::write(temp.path().join("NODE.001_01"), "x").expect("file should be written");
        fs::create_dir(temp.path().join("subdir")).expect("dir should be created");

        let workspace = Workspace::open(temp.path()).expect("workspace should open");
        let entries: Vec<&str> = workspace.entries().collect();

        assert_eq!(entries, vec!["NODE.001_01", "stdeo.1"]);
        assert!(!workspace.contains("subdir"));
    }

    #[test]
    fn require_reports_missing_artifact() {
        let workspace = Workspace::from_entries("/work", ["A"]);
        let error = workspace
            .require("B", "ARTIFACT.TEST")
            .expect_err("missing artifact should fail");

        assert_eq!(error.category(), ExpertiseErrorCategory::ArtifactNotFound);
        assert_eq!(error.code(), "ARTIFACT.TEST");
        assert!(workspace.require("A", "ARTIFACT.TEST").is_ok());
    }

    #[test]
    fn reference_artifact_matches_declared_kind() {
        let reference = ReferenceArtifact::new("ref_summary.json", "taskinfo");
        assert!(reference.has_kind("taskinfo"));
        assert!(!reference.has_kind("plisting"));
    }
}
