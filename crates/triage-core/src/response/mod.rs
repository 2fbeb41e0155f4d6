//! Provider answer contract.
//!
//! A provider is asked for exactly one JSON object per subject. This
//! module extracts that object from free-form text, validates it against
//! an embedded JSON Schema and maps it into a [`ClassificationResult`].
//!
//! [`ClassificationResult`]: crate::ClassificationResult

mod parser;
mod schema;

pub use parser::{extract_json_object, parse_classification, ResponseError, MODEL_CONFIDENCE};
pub use schema::validate_answer;
