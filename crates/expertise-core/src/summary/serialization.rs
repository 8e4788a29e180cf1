use crate::domain::ExpertiseError;
use serde::Serialize;
use serde_json::Value;
use serde_json::ser::PrettyFormatter;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const INDENT: &[u8] = b"    ";

#[derive(Debug, Error)]
pub enum SummaryIoError {
    #[error("failed to read JSON document '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse JSON document '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize JSON document: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write JSON document '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<SummaryIoError> for ExpertiseError {
    fn from(error: SummaryIoError) -> Self {
        // Read-side failures concern an input artifact; only writes are system errors.
        match &error {
            SummaryIoError::Read { .. } => {
                ExpertiseError::artifact_not_found("ARTIFACT.JSON_READ", error.to_string())
            }
            SummaryIoError::Parse { .. } => {
                ExpertiseError::parse("PARSE.JSON_DOCUMENT", error.to_string())
            }
            SummaryIoError::Serialize { .. } => {
                ExpertiseError::io_system("IO.JSON_SERIALIZE", error.to_string())
            }
            SummaryIoError::Write { .. } => {
                ExpertiseError::io_system("IO.JSON_WRITE", error.to_string())
            }
        }
    }
}

/// Renders with sorted keys, four-space indentation and a trailing newline.
pub fn to_pretty_json<T: Serialize>(value: &T) -> Result<String, SummaryIoError> {
    let mut buffer = Vec::new();
    let formatter = PrettyFormatter::with_indent(INDENT);
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    value
        .serialize(&mut serializer)
        .map_err(|source| SummaryIoError::Serialize { source })?;
    let mut rendered = String::from_utf8_lossy(&buffer).into_owned();
    rendered.push('\n');
    Ok(rendered)
}

pub fn write_json_document<T: Serialize>(path: &Path, value: &T) -> Result<(), SummaryIoError> {
    let rendered = to_pretty_json(value)?;
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| SummaryIoError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, rendered).map_err(|source| SummaryIoError::Write {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_json_document(path: &Path) -> Result<Value, SummaryIoError> {
    let content = fs::read_to_string(path).map_err(|source| SummaryIoError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| SummaryIoError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
