//! Reconnection Policy
//!
//! The client retries forever after a fixed delay until explicitly stopped.
//! Backoff growth, a delay cap, jitter, and an attempt limit exist only as
//! explicit configuration; the defaults keep the delay constant and the
//! retries unlimited.

use std::time::Duration;

use rand::Rng;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay before each reconnection attempt.
    pub delay: Duration,
    /// Multiplier applied after each attempt (1.0 keeps the delay fixed).
    pub multiplier: f64,
    /// Upper bound on the delay when a multiplier above 1.0 is configured.
    pub max_delay: Duration,
    /// Jitter factor as a fraction (0.0 disables jitter).
    pub jitter_factor: f64,
    /// Maximum number of attempts (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            multiplier: 1.0,
            max_delay: Duration::from_secs(60),
            jitter_factor: 0.0,
            max_attempts: 0,
        }
    }
}

impl RetryConfig {
    /// Fixed-delay configuration with unlimited attempts.
    #[must_use]
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }
}

/// Tracks retry attempts and produces the next delay.
#[derive(Debug)]
pub struct RetryPolicy {
    config: RetryConfig,
    current_delay: Duration,
    attempt_count: u32,
}

impl RetryPolicy {
    /// Create a new policy.
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        let current_delay = config.delay;
        Self {
            config,
            current_delay,
            attempt_count: 0,
        }
    }

    /// Get the delay for the next attempt, or `None` once a configured
    /// attempt limit is exhausted.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.config.max_attempts > 0 && self.attempt_count >= self.config.max_attempts {
            return None;
        }

        self.attempt_count += 1;
        let delay = self.apply_jitter(self.current_delay);

        if self.config.multiplier > 1.0 {
            #[allow(clippy::cast_precision_loss)]
            let scaled = (self.current_delay.as_millis() as f64 * self.config.multiplier).round();
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let scaled_millis = if scaled.is_finite() && scaled > 0.0 {
                scaled as u64
            } else {
                0
            };
            let capped = u64::try_from(self.config.max_delay.as_millis())
                .unwrap_or(u64::MAX)
                .min(scaled_millis);
            self.current_delay = Duration::from_millis(capped);
        }

        Some(delay)
    }

    /// Reset after a successful connection.
    pub const fn reset(&mut self) {
        self.current_delay = self.config.delay;
        self.attempt_count = 0;
    }

    /// Attempts made since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.config.jitter_factor;
        let mut rng = rand::rng();
        let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted = (base_millis + jitter).max(1.0) as u64;
        Duration::from_millis(adjusted)
    }
}
