//! The Gemini API key, kept out of logs.
//!
//! The key is moved into a [`SecretString`] the moment it is read and is
//! exposed only while the request header is built.

use secrecy::{ExposeSecret, SecretString};
use std::fmt;

use super::ProviderError;

/// Where the key came from; printed instead of the key itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// `provider.api_key` in the config file
    ConfigFile,
    /// Named environment variable
    EnvVar(String),
    /// Passed in by code
    Inline,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::ConfigFile => f.write_str("provider.api_key"),
            CredentialSource::EnvVar(var) => write!(f, "${var}"),
            CredentialSource::Inline => f.write_str("inline"),
        }
    }
}

/// API key plus its provenance.
pub struct ApiCredential {
    key: SecretString,
    source: CredentialSource,
}

fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

impl ApiCredential {
    pub fn inline(key: impl Into<String>) -> Self {
        Self {
            key: SecretString::from(key.into()),
            source: CredentialSource::Inline,
        }
    }

    /// Read the key from `env_var`; unset and blank are both missing.
    pub fn from_env(env_var: &str) -> Result<Self, ProviderError> {
        let value = std::env::var(env_var).unwrap_or_default();
        let key = non_blank(&value).ok_or_else(|| {
            ProviderError::NotConfigured(format!("API key missing: {env_var} is not set"))
        })?;

        Ok(Self {
            key: SecretString::from(key.to_string()),
            source: CredentialSource::EnvVar(env_var.to_string()),
        })
    }

    /// Prefer the configured key, else `env_var`.
    pub fn resolve(configured: Option<&str>, env_var: &str) -> Result<Self, ProviderError> {
        if let Some(key) = configured.and_then(non_blank) {
            return Ok(Self {
                key: SecretString::from(key.to_string()),
                source: CredentialSource::ConfigFile,
            });
        }

        Self::from_env(env_var).map_err(|_| {
            ProviderError::NotConfigured(format!(
                "API key missing: set provider.api_key or {env_var}"
            ))
        })
    }

    pub fn expose(&self) -> &str {
        self.key.expose_secret()
    }

    pub fn source(&self) -> &CredentialSource {
        &self.source
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ApiCredential").field(&self.source).finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key from {}", self.source)
    }
}
