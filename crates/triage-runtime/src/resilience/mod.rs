//! Quota protection for the classification provider.
//!
//! This module provides:
//! - Sliding-window rate limiter
//! - Circuit breaker with timed recovery
//! - Priority-based admission under pressure
//! - Retry with exponential backoff

mod admission;
mod circuit_breaker;
mod rate_limiter;
mod retry;

pub use admission::{AdmissionConfig, AdmissionDecision, AdmissionPolicy};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState, FailureKind};
pub use rate_limiter::{RateLimiter, DEFAULT_WINDOW};
pub use retry::{ClassificationError, RetryConfig, RetryExecutor};
