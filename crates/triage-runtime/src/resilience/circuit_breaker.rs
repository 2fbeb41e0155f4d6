//! Circuit breaker to prevent cascade failures.
//!
//! When provider calls fail repeatedly, or the provider reports that the
//! quota is exhausted, the circuit opens and every message falls back to
//! the deterministic classifier until the cooldown has elapsed.
//!
//! There is no half-open state: the circuit closes purely on elapsed
//! time, never on a trial call.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Circuit breaker configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening circuit
    #[serde(alias = "failureThreshold")]
    pub failure_threshold: u32,

    /// Cooldown before the circuit closes again (in seconds)
    #[serde(
        with = "duration_secs",
        alias = "reset_timeout_seconds",
        alias = "resetTimeoutSeconds"
    )]
    pub reset_timeout: Duration,
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(300),
        }
    }
}

/// Kind of failure reported to the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Provider reported quota exhaustion; opens the circuit at once
    QuotaExceeded,

    /// Any other transport or provider failure
    Other,
}

/// State of the circuit.
#[derive(Debug, Clone)]
pub enum CircuitState {
    /// Normal operation
    Closed { failures: u32 },

    /// Circuit is open, all calls bypass the provider
    Open {
        failures: u32,
        opened_at: Instant,
        opened_at_utc: DateTime<Utc>,
    },
}

impl CircuitState {
    fn failures(&self) -> u32 {
        match self {
            CircuitState::Closed { failures } | CircuitState::Open { failures, .. } => *failures,
        }
    }
}

/// Process-wide circuit breaker guarding the classification provider.
pub struct CircuitBreaker {
    state: Mutex<CircuitState>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    /// Create a new circuit breaker.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: Mutex::new(CircuitState::Closed { failures: 0 }),
            config,
        }
    }

    /// Check if the circuit is open.
    ///
    /// Returns true if calls should bypass the provider and use fallback.
    /// An open circuit whose cooldown has elapsed is closed here, with the
    /// failure counter reset.
    pub fn is_open(&self) -> bool {
        let mut state = self.state.lock();
        let elapsed = match &*state {
            CircuitState::Open { opened_at, .. } => opened_at.elapsed(),
            CircuitState::Closed { .. } => return false,
        };

        if elapsed >= self.config.reset_timeout {
            *state = CircuitState::Closed { failures: 0 };
            tracing::info!(
                open_for_secs = elapsed.as_secs(),
                "Circuit closed after cooldown"
            );
            false
        } else {
            true
        }
    }

    /// Record a successful provider call.
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        if let CircuitState::Closed { failures } = &mut *state {
            *failures = 0;
        }
    }

    /// Record a failed provider call.
    ///
    /// An open circuit stays open: only the cooldown closes it. A quota
    /// failure while open restarts the cooldown.
    pub fn record_failure(&self, kind: FailureKind) {
        let mut state = self.state.lock();

        if let CircuitState::Open {
            failures,
            opened_at,
            opened_at_utc,
        } = &mut *state
        {
            *failures = failures.saturating_add(1);
            if kind == FailureKind::QuotaExceeded {
                *opened_at = Instant::now();
                *opened_at_utc = Utc::now();
                tracing::warn!(
                    failures = *failures,
                    "Provider quota still exhausted, cooldown restarted"
                );
            }
            return;
        }

        let failures = state.failures().saturating_add(1);
        let open = match kind {
            FailureKind::QuotaExceeded => {
                tracing::warn!(
                    failures,
                    cooldown_secs = self.config.reset_timeout.as_secs(),
                    "Provider quota exhausted, opening circuit"
                );
                true
            }
            FailureKind::Other if failures >= self.config.failure_threshold => {
                tracing::warn!(
                    failures,
                    cooldown_secs = self.config.reset_timeout.as_secs(),
                    "Circuit opened after repeated failures"
                );
                true
            }
            FailureKind::Other => false,
        };

        *state = if open {
            CircuitState::Open {
                failures,
                opened_at: Instant::now(),
                opened_at_utc: Utc::now(),
            }
        } else {
            CircuitState::Closed { failures }
        };
    }

    /// Consecutive failures since the last success or close.
    pub fn consecutive_failures(&self) -> u32 {
        self.state.lock().failures()
    }

    /// When the circuit was opened, if it is open.
    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        match &*self.state.lock() {
            CircuitState::Open { opened_at_utc, .. } => Some(*opened_at_utc),
            CircuitState::Closed { .. } => None,
        }
    }

    /// Get current state of the circuit.
    pub fn state(&self) -> CircuitState {
        self.state.lock().clone()
    }

    /// Reset the circuit to closed.
    pub fn reset(&self) {
        *self.state.lock() = CircuitState::Closed { failures: 0 };
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
