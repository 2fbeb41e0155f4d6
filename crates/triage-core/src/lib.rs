//! # triage-core
//!
//! Deterministic building blocks for notification triage.
//!
//! This crate holds everything about triage that does not need the
//! network or a clock:
//! - The message model and its label pair
//! - The four classification tiers and the tag catalog
//! - Priority detection used to protect quota for high-stakes messages
//! - The fallback classifier
//! - The provider answer contract (extraction, schema validation, parsing)
//!
//! ## Example
//!
//! ```rust,ignore
//! use triage_core::{parse_classification, classify_default, Tier};
//!
//! let raw = r#"Sure: {"tier": "IMPORTANT", "tag_code": "13",
//!     "tag_name": "RESOLUCIONES NO CONTENCIOSAS", "reason": "pending resolution"}"#;
//!
//! let result = parse_classification(raw).unwrap_or_else(|_| classify_default());
//! assert_eq!(result.tier, Tier::Important);
//! ```

pub mod fallback;
pub mod priority;
pub mod response;
pub mod tags;
pub mod types;

pub use fallback::{classify_default, classify_default_because, FALLBACK_CONFIDENCE};
pub use priority::{has_priority_keyword, is_priority};
pub use response::{extract_json_object, parse_classification, ResponseError, MODEL_CONFIDENCE};
pub use tags::{UNLABELED_TAG, UNLABELED_TAG_NAME};
pub use types::{
    ClassificationEvent, ClassificationResult, ClassifiedMessage, FallbackReason, Message,
    ResultSource, Tier, UnknownTier,
};
