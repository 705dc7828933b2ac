//! Retry with exponential backoff and jitter.

use std::time::Duration;

use uuid::Uuid;

use scholarsnap_shared::RetrySection;

/// Backoff policy threaded into the [`Fetcher`](crate::Fetcher).
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Tries per request for transient failures, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles for each further retry.
    pub base_delay: Duration,
    /// Cap on the exponential part of the delay.
    pub max_delay: Duration,
    /// Upper bound of the random component added to each delay.
    pub jitter: Duration,
    /// Pause after a rate-limited/blocked response before the final try.
    pub cooldown: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySection::default())
    }
}

impl From<&RetrySection> for RetryPolicy {
    fn from(section: &RetrySection) -> Self {
        Self {
            max_attempts: section.max_attempts.max(1),
            base_delay: Duration::from_millis(section.base_delay_ms),
            max_delay: Duration::from_millis(section.max_delay_ms),
            jitter: Duration::from_millis(section.jitter_ms),
            cooldown: Duration::from_millis(section.cooldown_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay after the `failed_attempt`-th failure (1-based).
    ///
    /// `base * 2^(n-1)` capped at `max_delay`, plus `jitter * sample` where
    /// `sample` is clamped to `0.0..=1.0`.
    pub fn backoff(&self, failed_attempt: u32, sample: f64) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(31);
        let exponential = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);
        exponential + self.jitter.mul_f64(sample.clamp(0.0, 1.0))
    }

    /// Upper bound on the time one request can spend sleeping in retries.
    pub fn worst_case_wait(&self) -> Duration {
        let backoffs = (1..self.max_attempts)
            .map(|n| self.backoff(n, 1.0))
            .fold(Duration::ZERO, |acc, d| acc + d);
        backoffs + self.cooldown
    }
}

/// A uniform sample in `0.0..1.0` taken from the random bits of a UUID v7.
pub fn jitter_sample() -> f64 {
    let random = (Uuid::now_v7().as_u128() & u128::from(u32::MAX)) as u32;
    f64::from(random) / (f64::from(u32::MAX) + 1.0)
}
