//! Exponential backoff with full jitter
//!
//! Used by the upstream watcher between reconnect attempts.

use rand::Rng;
use std::time::Duration;

/// Configuration for reconnect backoff
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay ceiling for the first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Draw the actual delay uniformly from `[0, ceiling]`
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl BackoffConfig {
    /// Create a new backoff configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set initial delay
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set backoff multiplier
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Enable or disable jitter
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay ceiling for a 1-based attempt number, before jitter.
    #[must_use]
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = self.initial_delay.as_secs_f64() * self.multiplier.powi(exp);
        let max = self.max_delay.as_secs_f64();

        if !raw.is_finite() || raw < 0.0 || raw > max {
            self.max_delay
        } else {
            Duration::from_secs_f64(raw)
        }
    }

    /// Delay to wait before a 1-based attempt number.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt);
        if !self.jitter || ceiling.is_zero() {
            return ceiling;
        }
        let millis = ceiling.as_millis().min(u64::MAX as u128) as u64;
        Duration::from_millis(rand::thread_rng().gen_range(0..=millis))
    }
}

/// Attempt counter over a [`BackoffConfig`].
///
/// `reset` after every success; `next_delay` after every failure.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    /// Start a fresh counter
    #[must_use]
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Record a failure and return how long to wait before retrying.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        self.config.delay(self.attempt)
    }

    /// Clear the failure streak
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Consecutive failures since the last reset
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> BackoffConfig {
        BackoffConfig::default().with_jitter(false)
    }

    #[test]
    fn test_exponential_growth() {
        let config = no_jitter();
        assert_eq!(config.delay(1), Duration::from_millis(500));
        assert_eq!(config.delay(2), Duration::from_millis(1000));
        assert_eq!(config.delay(3), Duration::from_millis(2000));
        assert_eq!(config.delay(4), Duration::from_millis(4000));
    }

    #[test]
    fn test_capped_at_max() {
        let config = no_jitter();
        assert_eq!(config.delay(7), Duration::from_secs(30));
        assert_eq!(config.delay(200), Duration::from_secs(30));
        assert_eq!(config.delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_full_jitter_within_ceiling() {
        let config = BackoffConfig::default();
        for attempt in 1..12 {
            let ceiling = config.ceiling(attempt);
            for _ in 0..20 {
                assert!(config.delay(attempt) <= ceiling);
            }
        }
    }

    #[test]
    fn test_counter_reset() {
        let mut backoff = Backoff::new(no_jitter());
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
        assert_eq!(backoff.attempt(), 2);

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
    }
}
