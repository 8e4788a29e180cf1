//! Field-container decoding seam.
//!
//! Binary container formats live behind [`FieldsDecoder`]; the crate ships a
//! plain JSON container so the pipeline runs without one.

use crate::domain::ExpertiseError;
use crate::numerics::Field;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type DecodeResult<T> = Result<T, DecodeError>;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode '{path}': {message}")]
    Malformed { path: PathBuf, message: String },
    #[error("field '{field}' is not present in '{path}'")]
    MissingField { path: PathBuf, field: String },
}

impl From<DecodeError> for ExpertiseError {
    fn from(error: DecodeError) -> Self {
        match &error {
            DecodeError::Read { .. } => {
                ExpertiseError::artifact_not_found("ARTIFACT.DECODER_READ", error.to_string())
            }
            DecodeError::Malformed { .. } => {
                ExpertiseError::parse("PARSE.DECODER_MALFORMED", error.to_string())
            }
            DecodeError::MissingField { .. } => {
                ExpertiseError::parse("PARSE.DECODER_FIELD", error.to_string())
            }
        }
    }
}

/// An opened field container.
pub trait FieldResource {
    fn format(&self) -> &str;

    /// Field names, sorted.
    fn list_fields(&self) -> Vec<String>;

    fn read_field(&self, name: &str) -> DecodeResult<Field>;

    /// Every field of the container carries the same validity and geometry,
    /// so comparing metadata once is enough.
    fn shares_metadata_across_fields(&self) -> bool {
        false
    }
}

pub trait FieldsDecoder {
    fn open(&self, path: &Path) -> DecodeResult<Box<dyn FieldResource>>;
}

/// JSON container: `{"format": "FA", "fields": {"name": {shape, values, ...}}}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFieldsDecoder;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonFieldContainer {
    #[serde(default = "default_format")]
    format: String,
    #[serde(rename = "sharesMetadata", default)]
    shares_metadata: Option<bool>,
    fields: BTreeMap<String, Field>,
}

fn default_format() -> String {
    "JSON".to_string()
}

#[derive(Debug, Clone)]
struct JsonFieldResource {
    path: PathBuf,
    container: JsonFieldContainer,
}

impl FieldResource for JsonFieldResource {
    fn format(&self) -> &str {
        &self.container.format
    }

    fn list_fields(&self) -> Vec<String> {
        self.container.fields.keys().cloned().collect()
    }

    fn read_field(&self, name: &str) -> DecodeResult<Field> {
        self.container
            .fields
            .get(name)
            .cloned()
            .ok_or_else(|| DecodeError::MissingField {
                path: self.path.clone(),
                field: name.to_string(),
            })
    }

    fn shares_metadata_across_fields(&self) -> bool {
        self.container
            .shares_metadata
            .unwrap_or(self.container.format.eq_ignore_ascii_case("FA"))
    }
}

impl FieldsDecoder for JsonFieldsDecoder {
    fn open(&self, path: &Path) -> DecodeResult<Box<dyn FieldResource>> {
        let content = fs::read_to_string(path).map_err(|source| DecodeError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let container: JsonFieldContainer =
            serde_json::from_str(&content).map_err(|source| DecodeError::Malformed {
                path: path.to_path_buf(),
                message: source.to_string(),
            })?;
        Ok(Box::new(JsonFieldResource {
            path: path.to_path_buf(),
            container,
        }))
    }
}
