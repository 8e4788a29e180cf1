use super::grammar::grammar;
use crate::domain::{ExpertiseError, ExpertiseResult, Workspace};
use regex::Captures;
use std::fs;
use std::path::Path;

/// Lines of a text artifact from the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextArtifact {
    name: String,
    lines: Vec<String>,
}

impl TextArtifact {
    pub fn read(workspace: &Workspace, name: &str) -> ExpertiseResult<Self> {
        let path = workspace.require(name, "ARTIFACT.TEXT_OUTPUT")?;
        Self::read_path(&path, name)
    }

    pub fn read_path(path: &Path, name: &str) -> ExpertiseResult<Self> {
        let bytes = fs::read(path).map_err(|source| {
            ExpertiseError::artifact_not_found(
                "ARTIFACT.TEXT_OUTPUT_READ",
                format!("failed to read '{}': {}", path.display(), source),
            )
        })?;
        let content = String::from_utf8_lossy(&bytes);
        Ok(Self::from_lines(name, content.lines()))
    }

    pub fn from_lines<I, S>(name: impl Into<String>, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// First line matched by the named grammar, with its index.
    pub fn find_first(&self, grammar_name: &str) -> ExpertiseResult<Option<(usize, Captures<'_>)>> {
        let regex = grammar(grammar_name)?;
        Ok(self
            .lines
            .iter()
            .enumerate()
            .find_map(|(index, line)| regex.captures(line).map(|captures| (index, captures))))
    }

    /// Like [`Self::find_first`], but a missing match is a parse error.
    pub fn require_first(
        &self,
        grammar_name: &str,
        code: &'static str,
    ) -> ExpertiseResult<Captures<'_>> {
        self.find_first(grammar_name)?
            .map(|(_, captures)| captures)
            .ok_or_else(|| {
                ExpertiseError::parse(
                    code,
                    format!(
                        "pattern '{}' not found in '{}'",
                        grammar_name, self.name
                    ),
                )
            })
    }

    pub fn find_all(&self, grammar_name: &str) -> ExpertiseResult<Vec<(usize, Captures<'_>)>> {
        let regex = grammar(grammar_name)?;
        Ok(self
            .lines
            .iter()
            .enumerate()
            .filter_map(|(index, line)| regex.captures(line).map(|captures| (index, captures)))
            .collect())
    }
}
