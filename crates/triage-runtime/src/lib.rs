//! # triage-runtime
//!
//! Quota-aware LLM classification for tax portal notifications.
//!
//! The provider enforces a strict per-minute quota and answers HTTP 429
//! once it is spent. This crate keeps classification running anyway:
//! - A sliding-window rate limiter stops short of the quota
//! - A circuit breaker stops calling a failing provider for a cooldown
//! - An admission policy reserves scarce quota for priority messages
//! - Quota rejections are retried with exponential backoff
//! - Anything that goes wrong resolves to the deterministic fallback
//!
//! Every message always gets a classification; the cost of an outage is
//! accuracy, never availability.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use triage_runtime::{GeminiProvider, Orchestrator, RuntimeConfig};
//! use triage_core::Message;
//!
//! let config = RuntimeConfig::from_file("triage.yaml")?;
//! let provider = Arc::new(GeminiProvider::from_config(&config.provider)?);
//! let orchestrator = Orchestrator::builder()
//!     .provider(provider)
//!     .config(config)
//!     .build()?;
//!
//! let classified = orchestrator
//!     .classify_one(Message::new(1, "Resolución Coactiva de Embargo", "SUNAT"))
//!     .await;
//! ```

pub mod cache;
pub mod config;
pub mod notify;
pub mod orchestrator;
pub mod poller;
pub mod prompts;
pub mod providers;
pub mod resilience;
pub mod store;

pub use cache::{CacheConfig, ClassificationCache};
pub use config::{ConfigError, PollerConfig, ProviderConfig, RuntimeConfig};
pub use notify::{BroadcastSink, NotificationSink, NullSink, TracingSink};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, OrchestratorError, RateLimiterStatus};
pub use poller::{Poller, PollerError, PollerHandle, TickReport};
pub use prompts::build_classification_prompt;
pub use providers::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError, Role, TokenUsage,
};
pub use resilience::{
    AdmissionConfig, AdmissionDecision, AdmissionPolicy, CircuitBreaker, CircuitBreakerConfig,
    ClassificationError, FailureKind, RateLimiter, RetryConfig, RetryExecutor,
};
pub use store::{InMemoryStore, MessageStore, StoreError};

#[cfg(feature = "gemini")]
pub use providers::GeminiProvider;
