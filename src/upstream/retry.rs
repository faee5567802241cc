//! Backoff policy.
//!
//! Delay before retry `n` (1-based) is `initial_delay × multiplier^(n−1)`.
//! Growth is unbounded unless `max_delay` is set; the default leaves it
//! unset. Arithmetic saturates at [`Duration::MAX`].

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default number of connect attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10_000;

/// Default delay after the first failed attempt.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1000);

/// Default growth factor between consecutive delays.
pub const DEFAULT_MULTIPLIER: f64 = 1.5;

// ============================================================================
// RetryPolicy
// ============================================================================

/// Exponential backoff settings for the reconnect loop.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts before giving up.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Growth factor per attempt.
    pub multiplier: f64,
    /// Optional ceiling for a single delay.
    pub max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_INITIAL_DELAY, DEFAULT_MULTIPLIER)
    }
}

impl RetryPolicy {
    /// Creates an uncapped policy.
    #[inline]
    #[must_use]
    pub const fn new(max_attempts: u32, initial_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts,
            initial_delay,
            multiplier,
            max_delay: None,
        }
    }

    /// Caps every delay at `max_delay`.
    #[inline]
    #[must_use]
    pub const fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Returns the delay to wait after failed attempt `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let nanos = (self.initial_delay.as_nanos() as f64 * self.multiplier.powi(exponent)).round();

        let delay = if !nanos.is_finite() || nanos >= u64::MAX as f64 {
            Duration::MAX
        } else {
            Duration::from_nanos(nanos.max(0.0) as u64)
        };

        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    /// Validates the policy.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if there are no attempts, the initial delay is zero
    /// or the multiplier is below 1.0.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::config("retry max attempts must be at least 1"));
        }
        if self.initial_delay.is_zero() {
            return Err(Error::config("retry initial delay must be greater than zero"));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(Error::config("retry multiplier must be a finite value of at least 1.0"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
