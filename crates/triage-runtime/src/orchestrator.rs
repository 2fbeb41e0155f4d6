//! Classification orchestrator.
//!
//! For each message the orchestrator decides, in order:
//! 1. service disabled → fallback
//! 2. circuit open → fallback
//! 3. admission policy sheds the message → fallback
//! 4. cached model answer for the subject → cached result
//! 5. otherwise the provider is called through the retry executor and the
//!    answer parsed; any error → fallback
//!
//! Classification never fails. Only `tier` and `tag_code` are written
//! into the message.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use triage_core::{
    classify_default_because, parse_classification, ClassificationResult, ClassifiedMessage,
    FallbackReason, Message,
};

use crate::cache::ClassificationCache;
use crate::config::{ConfigError, RuntimeConfig};
use crate::notify::{NotificationSink, TracingSink};
use crate::prompts::build_classification_prompt;
use crate::providers::{CompletionConfig, LlmProvider};
use crate::resilience::{
    AdmissionPolicy, CircuitBreaker, ClassificationError, RateLimiter, RetryExecutor,
};

/// Errors from building an orchestrator.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Read-only snapshot of the quota protection state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimiterStatus {
    pub enabled: bool,
    pub requests_in_window: u32,
    pub ceiling: u32,
    pub breaker_open: bool,
    pub consecutive_failures: u32,
    pub breaker_opened_at: Option<DateTime<Utc>>,
}

/// Routes messages to the provider or the fallback classifier.
///
/// `Send + Sync`; one instance may serve the poller, on-demand batches
/// and single-message calls at once. The limiter and breaker are the
/// only shared mutable state.
pub struct Orchestrator {
    provider: Option<Arc<dyn LlmProvider>>,
    enabled: bool,
    limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
    admission: AdmissionPolicy,
    executor: RetryExecutor,
    completion: CompletionConfig,
    cache: Option<ClassificationCache>,
    sink: Arc<dyn NotificationSink>,
    batch_concurrency: usize,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Classify a batch and notify the sink once with every outcome.
    ///
    /// The returned vector is in input order. An empty batch notifies
    /// nobody.
    pub async fn classify_batch(&self, messages: Vec<Message>) -> Vec<ClassifiedMessage> {
        let total = messages.len();
        let classified: Vec<ClassifiedMessage> = stream::iter(messages)
            .map(|message| self.classify_message(message))
            .buffered(self.batch_concurrency)
            .collect()
            .await;

        if !classified.is_empty() {
            let events: Vec<_> = classified.iter().map(ClassifiedMessage::event).collect();
            self.sink.notify_batch(&events);
        }

        let fallbacks = classified
            .iter()
            .filter(|c| c.result.source.is_fallback())
            .count();
        tracing::info!(total, fallbacks, "Batch classification complete");

        classified
    }

    /// Classify one message and notify the sink immediately.
    pub async fn classify_one(&self, message: Message) -> ClassifiedMessage {
        let classified = self.classify_message(message).await;
        self.sink.notify_one(&classified.event());
        classified
    }

    /// Current limiter and breaker state.
    pub fn status(&self) -> RateLimiterStatus {
        let breaker_open = self.breaker.is_open();
        RateLimiterStatus {
            enabled: self.enabled,
            requests_in_window: self.limiter.requests_in_window(),
            ceiling: self.limiter.ceiling(),
            breaker_open,
            consecutive_failures: self.breaker.consecutive_failures(),
            breaker_opened_at: self.breaker.opened_at(),
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    async fn classify_message(&self, mut message: Message) -> ClassifiedMessage {
        let result = self.resolve(&message).await;
        message.apply(&result);

        tracing::debug!(
            message_id = message.id,
            tier = %result.tier,
            tag_code = %result.tag_code,
            source = ?result.source,
            "Message classified"
        );

        ClassifiedMessage { message, result }
    }

    async fn resolve(&self, message: &Message) -> ClassificationResult {
        let provider = match &self.provider {
            Some(provider) if self.enabled => provider,
            _ => return classify_default_because(FallbackReason::Disabled),
        };

        if self.breaker.is_open() {
            tracing::debug!(message_id = message.id, "Circuit open, using fallback classification");
            return classify_default_because(FallbackReason::CircuitOpen);
        }

        if !self
            .admission
            .should_attempt(message, &self.limiter, &self.breaker)
            .is_admit()
        {
            return classify_default_because(FallbackReason::Shed);
        }

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&message.subject).await {
                return hit;
            }
        }

        match self.call_provider(&**provider, &message.subject).await {
            Ok(result) => {
                if let Some(cache) = &self.cache {
                    cache.insert(&message.subject, &result).await;
                }
                result
            }
            Err(err) => {
                tracing::warn!(
                    message_id = message.id,
                    provider = provider.name(),
                    error = %err,
                    "Classification failed, using fallback"
                );
                classify_default_because(err.fallback_reason())
            }
        }
    }

    async fn call_provider(
        &self,
        provider: &dyn LlmProvider,
        subject: &str,
    ) -> Result<ClassificationResult, ClassificationError> {
        let prompt = build_classification_prompt(subject);
        let prompt = &prompt;
        let completion = &self.completion;

        let raw = self
            .executor
            .execute(move || async move {
                provider
                    .complete(prompt.clone(), completion)
                    .await
                    .map(|response| response.content)
            })
            .await?;

        parse_classification(&raw).map_err(|e| ClassificationError::MalformedResponse(e.to_string()))
    }
}

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    config: RuntimeConfig,
    limiter: Option<Arc<RateLimiter>>,
    breaker: Option<Arc<CircuitBreaker>>,
    sink: Option<Arc<dyn NotificationSink>>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            config: RuntimeConfig::default(),
            limiter: None,
            breaker: None,
            sink: None,
        }
    }

    /// Set the classification provider.
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Set the configuration.
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing rate limiter, e.g. with another orchestrator.
    pub fn limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Share an existing circuit breaker.
    pub fn breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Set the notification sink. Defaults to [`TracingSink`].
    pub fn sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Build the orchestrator.
    ///
    /// A provider is required unless the config disables classification.
    pub fn build(self) -> Result<Orchestrator, OrchestratorError> {
        let config = self.config;
        config.validate()?;

        if config.enabled && self.provider.is_none() {
            return Err(OrchestratorError::ProviderNotConfigured(
                "No provider set".to_string(),
            ));
        }

        let limiter = self
            .limiter
            .unwrap_or_else(|| Arc::new(RateLimiter::new(config.rate_limit_per_minute)));
        let breaker = self
            .breaker
            .unwrap_or_else(|| Arc::new(CircuitBreaker::new(config.circuit_breaker.clone())));
        let executor = RetryExecutor::new(
            Arc::clone(&limiter),
            Arc::clone(&breaker),
            config.retry.clone(),
        );
        let cache = config
            .cache
            .enabled
            .then(|| ClassificationCache::from_config(&config.cache));

        Ok(Orchestrator {
            provider: self.provider,
            enabled: config.enabled,
            limiter,
            breaker,
            admission: AdmissionPolicy::new(config.admission.clone()),
            executor,
            completion: config.provider.completion_config(),
            cache,
            sink: self.sink.unwrap_or_else(|| Arc::new(TracingSink::new())),
            batch_concurrency: config.batch_concurrency.max(1),
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
