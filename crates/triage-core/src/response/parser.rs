//! Parsing provider answers into classification results.
//!
//! Providers often wrap the requested JSON object in prose or code
//! fences. The parser takes the first balanced object, validates it and
//! maps it. Anything short of a fully valid answer is an error: callers
//! fall back instead of storing a partial result.

use serde::Deserialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

use super::schema::validate_answer;
use crate::tags;
use crate::types::{ClassificationResult, ResultSource, Tier, UnknownTier};

/// Confidence assigned to parsed model answers.
pub const MODEL_CONFIDENCE: f64 = 0.8;

/// Field aliases used by older prompt versions, mapped to canonical names.
const FIELD_ALIASES: &[(&str, &str)] = &[
    ("clasificacion", "tier"),
    ("etiqueta_codigo", "tag_code"),
    ("etiqueta_nombre", "tag_name"),
    ("razon", "reason"),
];

/// Errors from parsing a provider answer.
#[derive(Error, Debug)]
pub enum ResponseError {
    #[error("No balanced JSON object found in response")]
    NoJsonObject,

    #[error("Failed to parse JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Answer failed schema validation: {}", .0.join("; "))]
    SchemaViolation(Vec<String>),

    #[error(transparent)]
    UnknownTier(#[from] UnknownTier),
}

#[derive(Debug, Deserialize)]
struct RawAnswer {
    tier: String,
    tag_code: JsonValue,
    tag_name: String,
    reason: String,
}

/// Find the first balanced `{...}` substring.
///
/// Braces inside JSON string literals are ignored, including escaped
/// quotes. When an opening brace is never closed, the earliest object
/// that does close inside it is returned. Single pass over `text`.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let mut opens: Vec<usize> = Vec::new();
    let mut earliest: Option<(usize, usize)> = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' if !opens.is_empty() => in_string = true,
            '{' => opens.push(i),
            '}' => match opens.pop() {
                Some(start) if opens.is_empty() => return Some(&text[start..=i]),
                Some(start) => {
                    if earliest.map_or(true, |(first, _)| start < first) {
                        earliest = Some((start, i));
                    }
                }
                None => {}
            },
            _ => {}
        }
    }

    earliest.map(|(start, end)| &text[start..=end])
}

fn canonicalize_fields(answer: &mut JsonValue) {
    if let Some(object) = answer.as_object_mut() {
        for (alias, canonical) in FIELD_ALIASES {
            if !object.contains_key(*canonical) {
                if let Some(value) = object.remove(*alias) {
                    object.insert((*canonical).to_string(), value);
                }
            }
        }
    }
}

fn tag_code_string(value: &JsonValue) -> String {
    match value {
        JsonValue::Number(n) => match n.as_u64() {
            Some(code) => format!("{:02}", code),
            None => n.to_string(),
        },
        JsonValue::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

/// Parse a raw provider answer into a classification result.
pub fn parse_classification(raw: &str) -> Result<ClassificationResult, ResponseError> {
    let object = extract_json_object(raw).ok_or(ResponseError::NoJsonObject)?;

    let mut answer: JsonValue = serde_json::from_str(object)?;
    canonicalize_fields(&mut answer);
    validate_answer(&answer).map_err(ResponseError::SchemaViolation)?;

    let answer: RawAnswer = serde_json::from_value(answer)?;
    let tier: Tier = answer.tier.parse()?;
    let tag_code = tag_code_string(&answer.tag_code);

    let tag_name = match answer.tag_name.trim() {
        "" => tags::tag_name(&tag_code).unwrap_or_default().to_string(),
        name => name.to_string(),
    };

    if !tags::is_known(&tag_code) {
        tracing::debug!(tag_code = %tag_code, "Answer uses a tag code outside the catalog");
    }

    Ok(ClassificationResult {
        tier,
        tag_code,
        tag_name,
        reason: answer.reason.trim().to_string(),
        confidence: MODEL_CONFIDENCE,
        source: ResultSource::Model,
    })
}
