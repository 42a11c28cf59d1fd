//! Exponential backoff with jitter.
//!
//! Backoff for the attempt that just failed (1-based `k`) is
//! `base_delay * 2^(k-1)`, stretched upward by a random factor in
//! `[1, 1 + jitter_factor)` and capped at `max_delay`. Jitter only ever
//! lengthens a delay, so with `jitter_factor < 1` consecutive delays strictly
//! increase until they reach the cap.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::DeliveryError;

/// Retry policy for delivery tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of delivery attempts (including the initial attempt).
    pub max_attempts: u32,

    /// Delay after the first failed attempt.
    pub base_delay: Duration,

    /// Upper bound for any single delay, Retry-After included.
    pub max_delay: Duration,

    /// Upward jitter fraction, `0.0..1.0`.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Same policy with jitter disabled.
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.jitter_factor = 0.0;
        self
    }

    /// Delay before the attempt after `attempt_number`, ignoring any
    /// server-provided hint.
    pub fn backoff_delay(&self, attempt_number: u32) -> Duration {
        let exponent = attempt_number.saturating_sub(1).min(31);
        let unjittered = self
            .base_delay
            .checked_mul(1_u32 << exponent)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay));

        apply_jitter(unjittered, self.jitter_factor).min(self.max_delay)
    }
}

/// Context for deciding what happens after a failed attempt.
#[derive(Debug, Clone)]
pub struct RetryContext<'a> {
    /// Attempt that just failed (1-based).
    pub attempt_number: u32,
    /// Error the attempt failed with.
    pub error: &'a DeliveryError,
    /// Policy to apply.
    pub policy: &'a RetryPolicy,
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after the delay.
    Retry {
        /// Backoff before the next attempt
        delay: Duration,
    },
    /// Stop retrying.
    GiveUp {
        /// Why the task stops here
        reason: String,
    },
}

impl<'a> RetryContext<'a> {
    /// Creates a retry context for a failed attempt.
    pub fn new(attempt_number: u32, error: &'a DeliveryError, policy: &'a RetryPolicy) -> Self {
        Self { attempt_number, error, policy }
    }

    /// Decides whether to retry and how long to wait.
    ///
    /// Non-retryable errors give up immediately. Retryable errors give up
    /// once `max_attempts` attempts have been made. A rate-limit hint from the
    /// target can lengthen the computed backoff, never shorten it, and is
    /// still capped.
    pub fn decide_retry(&self) -> RetryDecision {
        if !self.error.is_retryable() {
            return RetryDecision::GiveUp { reason: format!("non-retryable error: {}", self.error) };
        }

        if self.attempt_number >= self.policy.max_attempts {
            return RetryDecision::GiveUp {
                reason: format!("maximum attempts ({}) exceeded", self.policy.max_attempts),
            };
        }

        RetryDecision::Retry { delay: self.calculate_delay() }
    }

    fn calculate_delay(&self) -> Duration {
        let backoff = self.policy.backoff_delay(self.attempt_number);

        match self.error.retry_after_seconds() {
            Some(retry_after_seconds) => {
                Duration::from_secs(retry_after_seconds).max(backoff).min(self.policy.max_delay)
            },
            None => backoff,
        }
    }
}

/// Stretches a delay by a random factor in `[1, 1 + jitter_factor)`.
fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 || duration.is_zero() {
        return duration;
    }

    let clamped = jitter_factor.min(0.999);
    let factor = 1.0 + rand::rng().random_range(0.0..clamped);

    Duration::try_from_secs_f64(duration.as_secs_f64() * factor).unwrap_or(duration)
}
