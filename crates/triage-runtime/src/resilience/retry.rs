//! Bounded retry with exponential backoff around the provider call.
//!
//! Only quota rejections are retried. A full local window is not: a
//! slot does not come back by waiting a second. Other provider errors
//! are not assumed transient and fail at once.

use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use triage_core::FallbackReason;

use super::{CircuitBreaker, FailureKind, RateLimiter};
use crate::providers::ProviderError;

/// Errors from one classification attempt sequence.
#[derive(Error, Debug)]
pub enum ClassificationError {
    #[error("Rate limit window exhausted")]
    RateLimited,

    #[error("Provider quota exceeded (retry after {retry_after:?})")]
    QuotaExceeded { retry_after: Option<Duration> },

    #[error("Provider call failed: {0}")]
    Other(#[source] ProviderError),

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
}

impl ClassificationError {
    /// Whether another attempt may succeed after backing off.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClassificationError::QuotaExceeded { .. })
    }

    /// Reason recorded on the fallback result this error resolves into.
    pub fn fallback_reason(&self) -> FallbackReason {
        match self {
            ClassificationError::RateLimited => FallbackReason::RateLimited,
            ClassificationError::QuotaExceeded { .. } => FallbackReason::QuotaExceeded,
            ClassificationError::Other(_) => FallbackReason::ProviderError,
            ClassificationError::MalformedResponse(_) => FallbackReason::MalformedResponse,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per message, including the first
    pub max_attempts: u32,

    /// Delay before the second attempt; doubled for each further one
    pub base_delay_ms: u64,
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Longest delay the schedule can produce.
    fn max_delay(&self) -> Duration {
        let doublings = self.max_attempts.saturating_sub(2).min(31);
        self.base_delay().saturating_mul(1u32 << doublings)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

/// Runs provider calls under the rate limiter and circuit breaker.
pub struct RetryExecutor {
    limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(limiter: Arc<RateLimiter>, breaker: Arc<CircuitBreaker>, config: RetryConfig) -> Self {
        Self {
            limiter,
            breaker,
            config,
        }
    }

    /// Execute `call` with up to `max_attempts` attempts.
    ///
    /// Every attempt takes a rate-limit slot first. Outcomes are reported
    /// to the breaker as they happen; the raw provider text is returned on
    /// the first success.
    pub async fn execute<F, Fut>(&self, call: F) -> Result<String, ClassificationError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<String, ProviderError>>,
    {
        let call = &call;
        let attempts = AtomicU32::new(0);
        let attempts = &attempts;
        let max_attempts = self.config.max_attempts.max(1);

        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.config.base_delay())
            .with_max_delay(self.config.max_delay())
            .with_factor(2.0)
            .with_max_times(max_attempts as usize - 1);

        (|| async move {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
            self.attempt(call, attempt, max_attempts).await
        })
        .retry(backoff)
        .sleep(tokio::time::sleep)
        .when(ClassificationError::is_retryable)
        .notify(|err: &ClassificationError, delay: Duration| {
            tracing::warn!(
                error = %err,
                attempt = attempts.load(Ordering::Relaxed),
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Provider quota exceeded, backing off before retry"
            );
        })
        .await
    }

    async fn attempt<F, Fut>(
        &self,
        call: &F,
        attempt: u32,
        max_attempts: u32,
    ) -> Result<String, ClassificationError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<String, ProviderError>>,
    {
        if !self.limiter.try_admit() {
            tracing::warn!(attempt, "Rate limit reached, not calling provider");
            return Err(ClassificationError::RateLimited);
        }

        match call().await {
            Ok(raw) => {
                self.breaker.record_success();
                Ok(raw)
            }
            Err(ProviderError::RateLimited { retry_after }) => {
                self.breaker.record_failure(FailureKind::QuotaExceeded);
                if attempt >= max_attempts {
                    tracing::error!(attempt, max_attempts, "Provider quota exceeded on final attempt");
                }
                Err(ClassificationError::QuotaExceeded { retry_after })
            }
            Err(ProviderError::InvalidEnvelope(detail)) => {
                // The provider answered; an undecodable envelope is not an outage.
                self.breaker.record_success();
                Err(ClassificationError::MalformedResponse(detail))
            }
            Err(err) => {
                self.breaker.record_failure(FailureKind::Other);
                tracing::warn!(attempt, error = %err, "Provider call failed, not retrying");
                Err(ClassificationError::Other(err))
            }
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}
