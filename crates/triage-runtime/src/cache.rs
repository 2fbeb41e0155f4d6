//! Caching layer for triage-runtime.
//!
//! The provider sees only the subject, so two messages with the same
//! subject get the same answer. Caching model results by normalized
//! subject saves quota on the portal's many repeated notices.

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use triage_core::{ClassificationResult, ResultSource};

/// Cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    /// Maximum number of subjects kept
    pub max_entries: u64,

    /// Time-to-live per entry
    #[serde(with = "crate::config::human_duration")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_entries: 10_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// Normalize a subject into a cache key.
///
/// Case and runs of whitespace do not change the provider's answer.
pub fn subject_key(subject: &str) -> String {
    subject
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Classification cache using moka.
pub struct ClassificationCache {
    cache: Cache<String, ClassificationResult>,
}

impl ClassificationCache {
    /// Create a new cache with the given limits.
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_entries, config.ttl)
    }

    /// Get the cached result for a subject, marked as cached.
    pub async fn get(&self, subject: &str) -> Option<ClassificationResult> {
        self.cache.get(&subject_key(subject)).await.map(|mut result| {
            result.source = ResultSource::Cached;
            result
        })
    }

    /// Store a model result. Fallback results are never cached.
    pub async fn insert(&self, subject: &str, result: &ClassificationResult) {
        if result.source != ResultSource::Model {
            return;
        }
        self.cache.insert(subject_key(subject), result.clone()).await;
    }
}

impl Default for ClassificationCache {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}
