//! Adapters from raw artifacts to structured records.
//!
//! Adapters validate that the expected records were found and raise a parse
//! error otherwise; numeric logic stays in [`crate::numerics`].

pub mod fields;
pub mod grammar;
pub mod norms;
pub mod profiling;
pub mod text;

pub use fields::{DecodeError, DecodeResult, FieldResource, FieldsDecoder, JsonFieldsDecoder};
pub use grammar::{grammar, grammar_names};
pub use norms::{JsonNormsDecoder, NormsDecoder};
pub use text::TextArtifact;

/// External decoders handed to experts at parse and compare time.
pub struct Decoders {
    pub fields: Box<dyn FieldsDecoder>,
    pub norms: Box<dyn NormsDecoder>,
}

impl Decoders {
    pub fn new(fields: Box<dyn FieldsDecoder>, norms: Box<dyn NormsDecoder>) -> Self {
        Self { fields, norms }
    }
}

impl Default for Decoders {
    fn default() -> Self {
        Self::new(Box::new(JsonFieldsDecoder), Box::new(JsonNormsDecoder))
    }
}

impl std::fmt::Debug for Decoders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoders").finish_non_exhaustive()
    }
}
