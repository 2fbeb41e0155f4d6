//! Priority detection for admission decisions.
//!
//! A priority message is one likely to carry real consequences:
//! collections, seizures, fines, audits or anything flagged urgent.
//! These are exempt from voluntary shedding when quota runs low.

use lazy_static::lazy_static;
use regex::Regex;

use crate::types::Message;

lazy_static! {
    /// Collection, enforcement, audit and urgency terms.
    ///
    /// Accented vowels are optional so subjects stripped of diacritics
    /// by the portal still match.
    pub static ref PRIORITY_PATTERN: Regex = Regex::new(
        r"(?i)resoluci[oó]n|cobranza|embargo|multa|fiscalizaci[oó]n|urgente"
    ).unwrap();
}

/// Check if a subject contains any priority keyword.
pub fn has_priority_keyword(subject: &str) -> bool {
    PRIORITY_PATTERN.is_match(subject)
}

/// Check if a message is priority by content or explicit flag.
pub fn is_priority(message: &Message) -> bool {
    message.urgent || has_priority_keyword(&message.subject)
}
