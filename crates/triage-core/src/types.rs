//! Core types for notification triage.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::tags::UNLABELED_TAG;

/// Classification tier, ranked by the attention a message requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    #[serde(alias = "MUY IMPORTANTE")]
    VeryImportant,
    #[serde(alias = "IMPORTANTE")]
    Important,
    #[serde(alias = "INFORMATIVO")]
    Informative,
    #[serde(alias = "RECURRENTE")]
    Recurrent,
}

impl Tier {
    /// All tiers, most urgent first.
    pub const ALL: [Tier; 4] = [
        Tier::VeryImportant,
        Tier::Important,
        Tier::Informative,
        Tier::Recurrent,
    ];

    /// Canonical wire name (e.g. `VERY_IMPORTANT`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::VeryImportant => "VERY_IMPORTANT",
            Tier::Important => "IMPORTANT",
            Tier::Informative => "INFORMATIVE",
            Tier::Recurrent => "RECURRENT",
        }
    }

    /// Name as used by the portal and the provider prompt.
    pub fn portal_name(&self) -> &'static str {
        match self {
            Tier::VeryImportant => "MUY IMPORTANTE",
            Tier::Important => "IMPORTANTE",
            Tier::Informative => "INFORMATIVO",
            Tier::Recurrent => "RECURRENTE",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a tier string outside the four known values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tier: '{0}'")]
pub struct UnknownTier(pub String);

impl FromStr for Tier {
    type Err = UnknownTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| match c {
                '-' | ' ' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect();

        match normalized.as_str() {
            "VERY_IMPORTANT" | "MUY_IMPORTANTE" => Ok(Tier::VeryImportant),
            "IMPORTANT" | "IMPORTANTE" => Ok(Tier::Important),
            "INFORMATIVE" | "INFORMATIVO" => Ok(Tier::Informative),
            "RECURRENT" | "RECURRENTE" => Ok(Tier::Recurrent),
            _ => Err(UnknownTier(s.to_string())),
        }
    }
}

/// A notification message received from the portal.
///
/// The label pair (`tier`, `tag_code`) is the only part this crate family
/// writes. `urgent` and `starred` belong to people and upstream systems.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Stable numeric identifier
    pub id: i64,

    /// Subject line
    #[serde(default)]
    pub subject: String,

    /// Sender identifier
    #[serde(default)]
    pub sender: String,

    /// Explicit urgency flag set upstream
    #[serde(default)]
    pub urgent: bool,

    /// Highlight flag set by a user
    #[serde(default)]
    pub starred: bool,

    /// Classification tier, absent until classified
    #[serde(default)]
    pub tier: Option<Tier>,

    /// Tag code, `"00"` while unlabelled
    #[serde(default = "default_tag_code")]
    pub tag_code: String,
}

fn default_tag_code() -> String {
    UNLABELED_TAG.to_string()
}

impl Message {
    /// Create an unlabelled message.
    pub fn new(id: i64, subject: impl Into<String>, sender: impl Into<String>) -> Self {
        Self {
            id,
            subject: subject.into(),
            sender: sender.into(),
            urgent: false,
            starred: false,
            tier: None,
            tag_code: default_tag_code(),
        }
    }

    /// Mark the message as urgent.
    pub fn urgent(mut self) -> Self {
        self.urgent = true;
        self
    }

    /// Whether the message still carries the unlabelled tag.
    pub fn is_unlabeled(&self) -> bool {
        self.tag_code == UNLABELED_TAG
    }

    /// Write a classification into the label pair.
    ///
    /// Human-owned flags are left untouched.
    pub fn apply(&mut self, result: &ClassificationResult) {
        self.tier = Some(result.tier);
        self.tag_code = result.tag_code.clone();
    }
}

/// Why a deterministic result was used instead of a model answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// Service administratively disabled
    Disabled,
    /// Circuit breaker open
    CircuitOpen,
    /// Shed by the admission policy
    Shed,
    /// Local rate-limit window exhausted
    RateLimited,
    /// Provider reported quota exhaustion
    QuotaExceeded,
    /// Transport or provider error
    ProviderError,
    /// Provider answered with something unusable
    MalformedResponse,
    /// No specific cause recorded
    Default,
}

/// Where a classification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "reason", rename_all = "snake_case")]
pub enum ResultSource {
    /// Parsed from a provider answer
    Model,
    /// Served from the result cache
    Cached,
    /// Deterministic default
    Fallback(FallbackReason),
}

impl ResultSource {
    pub fn is_fallback(&self) -> bool {
        matches!(self, ResultSource::Fallback(_))
    }
}

/// Output of one classification attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub tier: Tier,
    pub tag_code: String,
    pub tag_name: String,
    pub reason: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
    pub source: ResultSource,
}

/// A message after classification, with the result that labelled it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedMessage {
    pub message: Message,
    pub result: ClassificationResult,
}

impl ClassifiedMessage {
    /// Build the notification event for this message.
    pub fn event(&self) -> ClassificationEvent {
        ClassificationEvent {
            subject: self.message.subject.clone(),
            sender: self.message.sender.clone(),
            tier: self.result.tier,
            tag_name: self.result.tag_name.clone(),
            tag_code: self.result.tag_code.clone(),
            reason: self.result.reason.clone(),
        }
    }
}

/// What consumers are told about one classified message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationEvent {
    pub subject: String,
    pub sender: String,
    pub tier: Tier,
    pub tag_name: String,
    pub tag_code: String,
    pub reason: String,
}
