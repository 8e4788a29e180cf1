use crate::domain::{ExpertiseError, ReferenceArtifact, Scope};
use crate::experts::{ExpertSpec, ExpertVariant};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_TASK_OUTPUT: &str = "task_summary.json";

/// JSON task file: the experts to run and the references of each scope.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskConfig {
    #[serde(default = "default_true")]
    pub fatal_exceptions: bool,
    #[serde(default = "default_output")]
    pub output: String,
    pub experts: Vec<ExpertSpec>,
    #[serde(default)]
    pub references: TaskReferences,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TaskReferences {
    #[serde(default)]
    pub continuity: Vec<ReferenceArtifact>,
    #[serde(default)]
    pub consistency: Vec<ReferenceArtifact>,
}

impl TaskReferences {
    pub fn for_scope(&self, scope: Scope) -> &[ReferenceArtifact] {
        match scope {
            Scope::Continuity => &self.continuity,
            Scope::Consistency => &self.consistency,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_output() -> String {
    DEFAULT_TASK_OUTPUT.to_string()
}

#[derive(Debug, Error)]
pub enum TaskConfigError {
    #[error("failed to read task configuration '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse task configuration '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("task configuration declares no expert")]
    NoExperts,
    #[error("no expert is designated lead")]
    NoLead,
    #[error("several experts are designated lead: {}", .0.join(", "))]
    MultipleLeads(Vec<String>),
    #[error("expert label '{0}' is used more than once")]
    DuplicateLabel(String),
    #[error("expert label '{0}' is reserved for scope reports")]
    ReservedLabel(String),
    #[error("no expert registered for kind '{0}'")]
    UnknownKind(String),
    #[error("task output name must not be empty")]
    EmptyOutput,
}

impl From<TaskConfigError> for ExpertiseError {
    fn from(error: TaskConfigError) -> Self {
        let message = error.to_string();
        match error {
            TaskConfigError::Read { .. } => ExpertiseError::io_system("IO.TASK_CONFIG", message),
            TaskConfigError::Parse { .. } => {
                ExpertiseError::configuration("CONFIG.TASK_PARSE", message)
            }
            TaskConfigError::NoExperts => {
                ExpertiseError::configuration("CONFIG.NO_EXPERTS", message)
            }
            TaskConfigError::NoLead | TaskConfigError::MultipleLeads(_) => {
                ExpertiseError::configuration("CONFIG.LEAD", message)
            }
            TaskConfigError::DuplicateLabel(_) | TaskConfigError::ReservedLabel(_) => {
                ExpertiseError::configuration("CONFIG.LABEL", message)
            }
            TaskConfigError::UnknownKind(_) => {
                ExpertiseError::configuration("CONFIG.UNKNOWN_KIND", message)
            }
            TaskConfigError::EmptyOutput => ExpertiseError::configuration("CONFIG.OUTPUT", message),
        }
    }
}

impl TaskConfig {
    pub fn new(experts: Vec<ExpertSpec>) -> Self {
        Self {
            fatal_exceptions: true,
            output: default_output(),
            experts,
            references: TaskReferences::default(),
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TaskConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| TaskConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    pub fn from_json_str(json: &str) -> Result<Self, TaskConfigError> {
        Self::parse(json, Path::new("<inline-task>"))
    }

    fn parse(json: &str, path: &Path) -> Result<Self, TaskConfigError> {
        let config: TaskConfig =
            serde_json::from_str(json).map_err(|source| TaskConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Task-wide checks; per-variant options are checked when experts are
    /// built.
    pub fn validate(&self) -> Result<(), TaskConfigError> {
        if self.experts.is_empty() {
            return Err(TaskConfigError::NoExperts);
        }
        if self.output.trim().is_empty() {
            return Err(TaskConfigError::EmptyOutput);
        }

        let mut labels = BTreeSet::new();
        for spec in &self.experts {
            if ExpertVariant::from_kind(&spec.kind).is_none() {
                return Err(TaskConfigError::UnknownKind(spec.kind.clone()));
            }
            let label = spec.resolved_label();
            if Scope::from_key(label).is_some() {
                return Err(TaskConfigError::ReservedLabel(label.to_string()));
            }
            if !labels.insert(label) {
                return Err(TaskConfigError::DuplicateLabel(label.to_string()));
            }
        }

        let leads: Vec<String> = self
            .experts
            .iter()
            .filter(|spec| spec.lead)
            .map(|spec| spec.resolved_label().to_string())
            .collect();
        match leads.len() {
            0 => Err(TaskConfigError::NoLead),
            1 => Ok(()),
            _ => Err(TaskConfigError::MultipleLeads(leads)),
        }
    }

    pub fn lead_label(&self) -> Option<&str> {
        self.experts
            .iter()
            .find(|spec| spec.lead)
            .map(ExpertSpec::resolved_label)
    }
}
