//! Sliding-window rate limiter for provider calls.
//!
//! Enforces the provider's per-minute quota locally so that the process
//! stops short of the ceiling instead of discovering it through 429s.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Default window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Window {
    anchor: Instant,
    count: u32,
}

/// Rolling-window admission counter.
///
/// The window roll and the increment happen under one lock, so concurrent
/// callers can neither double-reset the window nor over-admit.
pub struct RateLimiter {
    ceiling: u32,
    window_len: Duration,
    window: Mutex<Window>,
}

impl RateLimiter {
    /// Create a limiter admitting `ceiling` calls per minute.
    pub fn new(ceiling: u32) -> Self {
        Self::with_window(ceiling, DEFAULT_WINDOW)
    }

    /// Create a limiter with a custom window length.
    pub fn with_window(ceiling: u32, window_len: Duration) -> Self {
        Self {
            ceiling,
            window_len,
            window: Mutex::new(Window {
                anchor: Instant::now(),
                count: 0,
            }),
        }
    }

    /// Try to take one slot in the current window.
    ///
    /// Never waits: a `false` is immediately actionable by the caller.
    pub fn try_admit(&self) -> bool {
        let now = Instant::now();
        let mut window = self.window.lock();

        if now.duration_since(window.anchor) >= self.window_len {
            window.anchor = now;
            window.count = 0;
        }

        if window.count < self.ceiling {
            window.count += 1;
            true
        } else {
            tracing::debug!(
                ceiling = self.ceiling,
                "Rate limit window exhausted"
            );
            false
        }
    }

    /// Calls admitted in the current window.
    ///
    /// An expired window reads as zero; it is not rolled here.
    pub fn requests_in_window(&self) -> u32 {
        let window = self.window.lock();
        if window.anchor.elapsed() >= self.window_len {
            0
        } else {
            window.count
        }
    }

    /// Configured ceiling per window.
    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Remaining slots in the current window.
    pub fn remaining(&self) -> u32 {
        self.ceiling.saturating_sub(self.requests_in_window())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(12)
    }
}
