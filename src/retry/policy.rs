//! Backoff policy: when a failed dispatch gets its next attempt.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

/// Exponential backoff with a cap, jitter, and an attempt limit.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Delay before the first re-attempt.
    pub initial_interval: Duration,
    /// Multiplier applied per attempt.
    pub multiplier: f64,
    /// Upper bound on the computed delay.
    pub max_interval: Duration,
    /// Attempts after which a lineage is abandoned.
    pub max_attempts: u32,
    /// Fraction of the delay randomized to de-synchronize workers (0.0 to
    /// disable).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::seconds(5),
            multiplier: 2.0,
            max_interval: Duration::minutes(10),
            max_attempts: 6,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Deterministic variant for tests.
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.jitter = 0.0;
        self
    }

    /// Backoff delay for the given attempt (0-based: attempt 0 is the first
    /// re-try). Monotonically non-decreasing up to `max_interval` before
    /// jitter.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_interval.num_milliseconds().max(1) as f64;
        let scaled = base_ms * self.multiplier.powi(attempt.min(63) as i32);
        let capped = scaled.min(self.max_interval.num_milliseconds().max(1) as f64);
        let jittered = if self.jitter > 0.0 {
            let spread = capped * self.jitter;
            capped + rand::rng().random_range(-spread..=spread)
        } else {
            capped
        };
        Duration::milliseconds(jittered.max(0.0) as i64)
    }

    /// Absolute next-retry instant for the given attempt.
    #[must_use]
    pub fn next_retry_time(&self, now: DateTime<Utc>, attempt: u32) -> DateTime<Utc> {
        now + self.backoff(attempt)
    }

    /// Whether a lineage with `retry_count` completed attempts is spent.
    #[must_use]
    pub fn is_exhausted(&self, retry_count: u32) -> bool {
        retry_count >= self.max_attempts
    }
}
