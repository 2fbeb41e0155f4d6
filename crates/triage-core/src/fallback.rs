//! Deterministic fallback classification.
//!
//! Used whenever a model answer cannot be obtained, so every message
//! ends up labelled and consumers never wait on provider availability.

use crate::tags::{UNLABELED_TAG, UNLABELED_TAG_NAME};
use crate::types::{ClassificationResult, FallbackReason, ResultSource, Tier};

/// Confidence assigned to fallback results.
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

/// The fixed low-confidence default classification.
pub fn classify_default() -> ClassificationResult {
    classify_default_because(FallbackReason::Default)
}

/// The default classification, tagged with why it was used.
pub fn classify_default_because(reason: FallbackReason) -> ClassificationResult {
    ClassificationResult {
        tier: Tier::Recurrent,
        tag_code: UNLABELED_TAG.to_string(),
        tag_name: UNLABELED_TAG_NAME.to_string(),
        reason: "default classification".to_string(),
        confidence: FALLBACK_CONFIDENCE,
        source: ResultSource::Fallback(reason),
    }
}
