//! Google Gemini provider implementation.
//!
//! Calls `generateContent` with the system prompt as `systemInstruction`
//! and the remaining turns as `contents`. HTTP 429 is reported as
//! [`ProviderError::RateLimited`].

use super::{
    secrets::ApiCredential, ChatMessage, CompletionConfig, CompletionResponse, LlmProvider,
    ProviderError, Role, TokenUsage,
};
use crate::config::ProviderConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable name for the Gemini API key.
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Public Gemini endpoint.
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini `generateContent` provider.
pub struct GeminiProvider {
    credential: ApiCredential,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GeminiProvider {
    /// Create a provider with an explicit API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_credential(ApiCredential::inline(api_key), DEFAULT_GEMINI_BASE_URL)
    }

    /// Create from the `GEMINI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self, ProviderError> {
        let credential = ApiCredential::from_env(GEMINI_API_KEY_ENV)?;
        Self::with_credential(credential, DEFAULT_GEMINI_BASE_URL)
    }

    /// Create from configuration, falling back to `GEMINI_API_KEY`.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let credential = ApiCredential::resolve(config.api_key.as_deref(), GEMINI_API_KEY_ENV)?;

        if !config.base_url.starts_with("http://") && !config.base_url.starts_with("https://") {
            return Err(ProviderError::NotConfigured(
                "base_url must start with http:// or https://".to_string(),
            ));
        }

        tracing::debug!(
            credential = %credential,
            base_url = %config.base_url,
            "Configured Gemini provider"
        );
        Self::with_credential(credential, &config.base_url)
    }

    fn with_credential(credential: ApiCredential, base_url: &str) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        Ok(Self {
            credential,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }
}

/// Gemini API request format.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

/// Gemini API response format.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
}

fn text_content(role: Option<&str>, text: String) -> Content {
    Content {
        role: role.map(str::to_string),
        parts: vec![Part { text: Some(text) }],
    }
}

fn build_request(messages: Vec<ChatMessage>, config: &CompletionConfig) -> GeminiRequest {
    let mut system = Vec::new();
    let mut contents = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => system.push(msg.content),
            Role::User => contents.push(text_content(Some("user"), msg.content)),
            Role::Model => contents.push(text_content(Some("model"), msg.content)),
        }
    }

    GeminiRequest {
        system_instruction: if system.is_empty() {
            None
        } else {
            Some(text_content(None, system.join("\n\n")))
        },
        contents,
        generation_config: GenerationConfig {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        },
    }
}

fn decode_response(body: GeminiResponse, config: &CompletionConfig) -> Result<CompletionResponse, ProviderError> {
    let candidate = body
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::InvalidEnvelope("response has no candidates".to_string()))?;

    let content = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<Vec<_>>().join(""))
        .unwrap_or_default();

    if content.is_empty() {
        return Err(ProviderError::InvalidEnvelope(format!(
            "candidate has no text (finish reason {:?})",
            candidate.finish_reason
        )));
    }

    let usage = body
        .usage_metadata
        .map(|u| TokenUsage {
            prompt_tokens: u.prompt_token_count,
            output_tokens: u.candidates_token_count,
        })
        .unwrap_or_default();

    Ok(CompletionResponse {
        content,
        usage,
        model: body.model_version.unwrap_or_else(|| config.model.clone()),
        finish_reason: candidate.finish_reason,
    })
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = build_request(messages, config);

        let response = self
            .client
            .post(self.endpoint(&config.model))
            .header("x-goog-api-key", self.credential.expose())
            .timeout(config.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(config.timeout)
                } else {
                    ProviderError::Transport(e.to_string())
                }
            })?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited {
                retry_after: retry_after(response.headers()),
            });
        }

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ProviderError::Unauthorized);
        }

        if !status.is_success() {
            let message = match response.json::<GeminiError>().await {
                Ok(body) => body.error.message,
                Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
            };
            return Err(ProviderError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body: GeminiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidEnvelope(e.to_string()))?;

        let completion = decode_response(body, config)?;
        tracing::debug!(
            model = %completion.model,
            tokens = completion.usage.total(),
            "Gemini completion received"
        );
        Ok(completion)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_splits_system_instruction() {
        let messages = vec![
            ChatMessage::system("Eres un clasificador."),
            ChatMessage::user("ASUNTO: \"Orden de Pago\""),
        ];
        let request = build_request(messages, &CompletionConfig::default());
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(
            json["systemInstruction"]["parts"][0]["text"],
            "Eres un clasificador."
        );
        assert!(json["systemInstruction"].get("role").is_none());
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "ASUNTO: \"Orden de Pago\"");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 500);
    }

    #[test]
    fn test_request_without_system_omits_instruction() {
        let request = build_request(vec![ChatMessage::user("hola")], &CompletionConfig::default());
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("systemInstruction").is_none());
    }

    #[test]
    fn test_decode_joins_candidate_parts() {
        let body: GeminiResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "{\"tier\":"}, {"text": "\"IMPORTANT\"}"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 410, "candidatesTokenCount": 35},
            "modelVersion": "gemini-1.5-flash-002"
        }))
        .unwrap();

        let completion = decode_response(body, &CompletionConfig::default()).unwrap();
        assert_eq!(completion.content, "{\"tier\":\"IMPORTANT\"}");
        assert_eq!(completion.usage.total(), 445);
        assert_eq!(completion.model, "gemini-1.5-flash-002");
        assert_eq!(completion.finish_reason.as_deref(), Some("STOP"));
    }

    #[test]
    fn test_decode_without_candidates_is_parse_error() {
        let body: GeminiResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        let err = decode_response(body, &CompletionConfig::default()).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidEnvelope(_)));
    }

    #[test]
    fn test_decode_blocked_candidate_is_parse_error() {
        let body: GeminiResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{"finishReason": "SAFETY"}]
        }))
        .unwrap();
        let err = decode_response(body, &CompletionConfig::default()).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_retry_after_header() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, "17".parse().unwrap());
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(17)));

        headers.insert(reqwest::header::RETRY_AFTER, "soon".parse().unwrap());
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn test_endpoint_and_debug_redaction() {
        let provider = GeminiProvider::new("AIza-secret").unwrap();
        assert_eq!(
            provider.endpoint("gemini-1.5-flash"),
            format!("{}/models/gemini-1.5-flash:generateContent", DEFAULT_GEMINI_BASE_URL)
        );
        assert!(!format!("{:?}", provider).contains("AIza-secret"));
    }

    #[test]
    fn test_from_config_rejects_bad_url() {
        let config = ProviderConfig {
            api_key: Some("key".to_string()),
            base_url: "ftp://example".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            GeminiProvider::from_config(&config),
            Err(ProviderError::NotConfigured(_))
        ));
    }
}
