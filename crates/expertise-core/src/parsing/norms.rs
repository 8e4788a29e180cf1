use super::fields::{DecodeError, DecodeResult};
use crate::numerics::NormSet;
use std::fs;
use std::path::Path;

/// Extracts the norm set printed in a run listing.
pub trait NormsDecoder {
    fn decode(&self, path: &Path) -> DecodeResult<NormSet>;
}

/// Norms stored as `{"steps": [{"step": .., "spnorms": {..}, "gpnorms": {..}}]}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonNormsDecoder;

impl NormsDecoder for JsonNormsDecoder {
    fn decode(&self, path: &Path) -> DecodeResult<NormSet> {
        let content = fs::read_to_string(path).map_err(|source| DecodeError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let normset: NormSet =
            serde_json::from_str(&content).map_err(|source| DecodeError::Malformed {
                path: path.to_path_buf(),
                message: source.to_string(),
            })?;
        if normset.is_empty() {
            return Err(DecodeError::Malformed {
                path: path.to_path_buf(),
                message: "no norms found".to_string(),
            });
        }
        Ok(normset)
    }
}
