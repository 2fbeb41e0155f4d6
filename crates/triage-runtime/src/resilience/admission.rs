//! Voluntary load shedding under quota pressure.
//!
//! The breaker is a hard stop; this policy is the soft one. When the
//! provider has been failing, or the current window is nearly spent,
//! only priority messages are sent so that the remaining headroom goes
//! to collections, audits and fines.

use serde::{Deserialize, Serialize};
use triage_core::{is_priority, Message};

use super::{CircuitBreaker, RateLimiter};

/// Admission policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Consecutive failures from which only priority messages are sent
    pub failure_floor: u32,

    /// Fraction of the window ceiling from which only priority messages are sent
    pub pressure_ratio: f64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            failure_floor: 3,
            pressure_ratio: 0.8,
        }
    }
}

/// Outcome of the admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// Spend quota on this message
    Admit,

    /// Use the fallback classifier instead
    Skip,
}

impl AdmissionDecision {
    pub fn is_admit(&self) -> bool {
        matches!(self, AdmissionDecision::Admit)
    }
}

/// Priority-based admission filter.
#[derive(Debug, Clone, Default)]
pub struct AdmissionPolicy {
    config: AdmissionConfig,
}

impl AdmissionPolicy {
    pub fn new(config: AdmissionConfig) -> Self {
        Self { config }
    }

    /// Decide whether a message should be sent to the provider.
    ///
    /// Callers check `breaker.is_open()` first; an open circuit is not
    /// this policy's concern.
    pub fn should_attempt(
        &self,
        message: &Message,
        limiter: &RateLimiter,
        breaker: &CircuitBreaker,
    ) -> AdmissionDecision {
        let failures = breaker.consecutive_failures();
        if failures >= self.config.failure_floor {
            return self.priority_only(message, "provider failing");
        }

        let in_window = limiter.requests_in_window() as f64;
        let pressure_mark = limiter.ceiling() as f64 * self.config.pressure_ratio;
        if in_window >= pressure_mark {
            return self.priority_only(message, "window near ceiling");
        }

        AdmissionDecision::Admit
    }

    fn priority_only(&self, message: &Message, pressure: &'static str) -> AdmissionDecision {
        if is_priority(message) {
            AdmissionDecision::Admit
        } else {
            tracing::info!(
                message_id = message.id,
                pressure,
                "Shedding non-priority message to conserve quota"
            );
            AdmissionDecision::Skip
        }
    }
}
