//! Runtime configuration.
//!
//! Every field has a default, so an empty document is a valid config.
//! Keys are snake_case; the camelCase spellings used by older
//! deployments are accepted as aliases.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::cache::CacheConfig;
use crate::providers::CompletionConfig;
use crate::resilience::{AdmissionConfig, CircuitBreakerConfig, RetryConfig};

/// Errors from loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Durations written as `"5m"`, `"300s"` or a bare number of seconds.
pub mod human_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Secs(u64),
        Text(String),
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Repr::deserialize(deserializer)? {
            Repr::Secs(secs) => Ok(Duration::from_secs(secs)),
            Repr::Text(text) => humantime::parse_duration(text.trim()).map_err(serde::de::Error::custom),
        }
    }
}

/// Classification provider settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub model: String,

    #[serde(alias = "baseUrl")]
    pub base_url: String,

    #[serde(with = "human_duration")]
    pub timeout: Duration,

    pub temperature: f32,

    #[serde(alias = "maxOutputTokens")]
    pub max_output_tokens: u32,

    /// Static API key; `GEMINI_API_KEY` is used when absent
    #[serde(alias = "apiKey", skip_serializing)]
    pub api_key: Option<String>,
}

impl ProviderConfig {
    /// Per-request settings derived from this config.
    pub fn completion_config(&self) -> CompletionConfig {
        CompletionConfig {
            model: self.model.clone(),
            max_output_tokens: self.max_output_tokens,
            temperature: self.temperature,
            timeout: self.timeout,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        let completion = CompletionConfig::default();
        Self {
            model: completion.model,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout: completion.timeout,
            temperature: completion.temperature,
            max_output_tokens: completion.max_output_tokens,
            api_key: None,
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Periodic classification of pending messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Time between ticks
    #[serde(with = "human_duration")]
    pub interval: Duration,

    /// Pending messages taken per tick
    #[serde(alias = "maxPerTick")]
    pub max_per_tick: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            max_per_tick: 5,
        }
    }
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// When false every message gets the fallback classification
    pub enabled: bool,

    /// Provider calls admitted per rolling minute
    #[serde(alias = "rateLimitPerMinute")]
    pub rate_limit_per_minute: u32,

    #[serde(alias = "circuitBreaker")]
    pub circuit_breaker: CircuitBreakerConfig,

    pub retry: RetryConfig,

    pub admission: AdmissionConfig,

    /// Messages of one batch classified concurrently
    #[serde(alias = "batchConcurrency")]
    pub batch_concurrency: usize,

    pub cache: CacheConfig,

    pub provider: ProviderConfig,

    pub poller: PollerConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rate_limit_per_minute: 12,
            circuit_breaker: CircuitBreakerConfig::default(),
            retry: RetryConfig::default(),
            admission: AdmissionConfig::default(),
            batch_concurrency: 1,
            cache: CacheConfig::default(),
            provider: ProviderConfig::default(),
            poller: PollerConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parse a config from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a config from JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file; `.json` files are read as JSON, anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&contents),
            _ => Self::from_yaml(&contents),
        }
    }

    /// Check value ranges the type system does not.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit_per_minute == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit_per_minute must be at least 1 (use enabled: false to stop provider calls)"
                    .to_string(),
            ));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "circuit_breaker.failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if !(self.admission.pressure_ratio > 0.0 && self.admission.pressure_ratio <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "admission.pressure_ratio must be in (0, 1], got {}",
                self.admission.pressure_ratio
            )));
        }
        if self.batch_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "batch_concurrency must be at least 1".to_string(),
            ));
        }
        if self.poller.interval.is_zero() || self.poller.max_per_tick == 0 {
            return Err(ConfigError::Invalid(
                "poller.interval and poller.max_per_tick must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = RuntimeConfig::from_yaml("{}").unwrap();

        assert!(config.enabled);
        assert_eq!(config.rate_limit_per_minute, 12);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.circuit_breaker.reset_timeout, Duration::from_secs(300));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.admission.failure_floor, 3);
        assert_eq!(config.batch_concurrency, 1);
        assert!(!config.cache.enabled);
        assert_eq!(config.poller.interval, Duration::from_secs(300));
        assert_eq!(config.poller.max_per_tick, 5);
    }

    #[test]
    fn test_camel_case_aliases() {
        let yaml = r#"
enabled: false
rateLimitPerMinute: 20
circuitBreaker:
  failureThreshold: 2
  resetTimeoutSeconds: 60
provider:
  apiKey: from-file
  maxOutputTokens: 256
"#;
        let config = RuntimeConfig::from_yaml(yaml).unwrap();

        assert!(!config.enabled);
        assert_eq!(config.rate_limit_per_minute, 20);
        assert_eq!(config.circuit_breaker.failure_threshold, 2);
        assert_eq!(config.circuit_breaker.reset_timeout, Duration::from_secs(60));
        assert_eq!(config.provider.api_key.as_deref(), Some("from-file"));
        assert_eq!(config.provider.max_output_tokens, 256);
    }

    #[test]
    fn test_durations_accept_text_and_seconds() {
        let config = RuntimeConfig::from_yaml("poller:\n  interval: 90s\nprovider:\n  timeout: 15\n").unwrap();
        assert_eq!(config.poller.interval, Duration::from_secs(90));
        assert_eq!(config.provider.timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_api_key_never_printed_or_serialized() {
        let config = RuntimeConfig::from_json(r#"{"provider": {"api_key": "AIza-secret"}}"#).unwrap();

        assert!(!format!("{:?}", config).contains("AIza-secret"));
        assert!(!serde_json::to_string(&config).unwrap().contains("AIza-secret"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            RuntimeConfig::from_yaml("rate_limit_per_minute: 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RuntimeConfig::from_yaml("admission:\n  pressure_ratio: 1.5"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RuntimeConfig::from_yaml("retry:\n  max_attempts: 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RuntimeConfig::from_yaml("enabled: [1"),
            Err(ConfigError::YamlError(_))
        ));
    }

    #[test]
    fn test_completion_config_from_provider() {
        let provider = ProviderConfig {
            model: "gemini-1.5-pro".to_string(),
            max_output_tokens: 128,
            ..Default::default()
        };
        let completion = provider.completion_config();
        assert_eq!(completion.model, "gemini-1.5-pro");
        assert_eq!(completion.max_output_tokens, 128);
    }
}
