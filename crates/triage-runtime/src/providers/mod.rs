//! The classification model seen from the orchestrator.
//!
//! Everything above this module talks to the model through
//! [`LlmProvider`] and branches on [`ProviderError`]; only
//! [`ProviderError::RateLimited`] is treated as a quota signal. The
//! Gemini client lives behind the `gemini` feature and keeps its key in
//! an [`ApiCredential`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub mod secrets;

#[cfg(feature = "gemini")]
mod gemini;

pub use secrets::{ApiCredential, CredentialSource};

#[cfg(feature = "gemini")]
pub use gemini::{GeminiProvider, DEFAULT_GEMINI_BASE_URL, GEMINI_API_KEY_ENV};

/// Failure of one provider call.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Provider-side quota spent (HTTP 429)
    #[error("Provider quota exhausted (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("No answer within {0:?}")]
    Timeout(Duration),

    #[error("Provider rejected the API key")]
    Unauthorized,

    #[error("Provider returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The HTTP body was not a usable completion envelope
    #[error("Unusable response envelope: {0}")]
    InvalidEnvelope(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

/// Per-request model settings.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub model: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-flash".to_string(),
            max_output_tokens: 500,
            temperature: 0.0,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Speaker of a prompt turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Standing instructions; Gemini takes these as `systemInstruction`
    System,
    User,
    Model,
}

/// One turn of a prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }
}

/// Text the model produced, plus what it cost.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub usage: TokenUsage,
    /// Model version that answered
    pub model: String,
    pub finish_reason: Option<String>,
}

/// Token accounting reported by the provider; zero when absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.output_tokens)
    }
}

/// A model that can answer a classification prompt.
///
/// Implementations must report quota exhaustion as
/// [`ProviderError::RateLimited`]; it is the only error the retry
/// executor backs off on.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Short name for log fields.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_serialize_lowercase() {
        let turn = ChatMessage::system("Clasifica el asunto.");
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json["role"], "system");
        assert!(turn.is_system());
        assert!(!ChatMessage::user("Orden de Pago").is_system());
    }

    #[test]
    fn test_token_usage_total_saturates() {
        let usage = TokenUsage {
            prompt_tokens: u32::MAX,
            output_tokens: 60,
        };
        assert_eq!(usage.total(), u32::MAX);
    }

    #[test]
    fn test_quota_error_mentions_retry_after() {
        let err = ProviderError::RateLimited {
            retry_after: Some(Duration::from_secs(30)),
        };
        assert!(err.to_string().contains("30s"));
    }
}
