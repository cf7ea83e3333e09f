//! # Backoff Calculator
//!
//! Computes the delay between retry attempts of a failed operation.
//!
//! The delay before the attempt following attempt `n` (1-based) is
//! `base_backoff * multiplier^(n - 1)`, capped at `max_backoff`. When the
//! policy enables jitter an additive random component of up to
//! `max_jitter` of the computed delay is added, never subtracted, so the
//! exponential lower bound always holds. The jittered value is capped again.

use crate::constants::defaults;
use crate::models::RetryPolicy;
use std::time::Duration;

/// Calculates retry delays from a [`RetryPolicy`]
#[derive(Debug, Clone)]
pub struct BackoffCalculator {
    max_jitter: f64,
}

impl Default for BackoffCalculator {
    fn default() -> Self {
        Self::new(defaults::MAX_JITTER)
    }
}

impl BackoffCalculator {
    /// Create a calculator whose jitter adds at most `max_jitter` (0.0 to 1.0)
    /// of the computed delay
    pub fn new(max_jitter: f64) -> Self {
        Self {
            max_jitter: max_jitter.clamp(0.0, 1.0),
        }
    }

    /// Delay to wait after `attempt` failed, before the next attempt starts
    pub fn delay_for(&self, policy: &RetryPolicy, attempt: u32) -> Duration {
        let capped = Self::exponential_ms(policy, attempt);
        let max_ms = policy.max_backoff_ms as f64;

        let delay_ms = if policy.jitter && self.max_jitter > 0.0 {
            (capped + capped * self.max_jitter * fastrand::f64()).min(max_ms)
        } else {
            capped
        };

        Duration::from_millis(delay_ms.ceil() as u64)
    }

    /// Lower bound of the delay after `attempt`, ignoring jitter
    pub fn minimum_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
        Duration::from_millis(Self::exponential_ms(policy, attempt).ceil() as u64)
    }

    /// Delays between each pair of consecutive attempts the policy allows
    pub fn schedule(&self, policy: &RetryPolicy) -> Vec<Duration> {
        (1..policy.max_attempts)
            .map(|attempt| self.delay_for(policy, attempt))
            .collect()
    }

    fn exponential_ms(policy: &RetryPolicy, attempt: u32) -> f64 {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let raw = policy.base_backoff_ms as f64 * policy.multiplier.powi(exponent);
        raw.min(policy.max_backoff_ms as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(5)
            .with_backoff(Duration::from_millis(100), 2.0, Duration::from_millis(1_000))
    }

    #[test]
    fn test_exponential_growth_without_jitter() {
        let calculator = BackoffCalculator::default();
        let policy = policy().with_jitter(false);

        assert_eq!(calculator.delay_for(&policy, 1), Duration::from_millis(100));
        assert_eq!(calculator.delay_for(&policy, 2), Duration::from_millis(200));
        assert_eq!(calculator.delay_for(&policy, 3), Duration::from_millis(400));
        assert_eq!(calculator.delay_for(&policy, 4), Duration::from_millis(800));
    }

    #[test]
    fn test_delay_capped_at_max_backoff() {
        let calculator = BackoffCalculator::default();
        let policy = policy().with_jitter(false);

        assert_eq!(calculator.delay_for(&policy, 5), Duration::from_millis(1_000));
        assert_eq!(calculator.delay_for(&policy, 40), Duration::from_millis(1_000));
        assert_eq!(
            calculator.delay_for(&policy, u32::MAX),
            Duration::from_millis(1_000)
        );
    }

    #[test]
    fn test_jitter_is_additive_and_bounded() {
        let calculator = BackoffCalculator::new(0.5);
        let policy = policy().with_jitter(true);

        for _ in 0..200 {
            let delay = calculator.delay_for(&policy, 2);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(300));
        }

        for _ in 0..50 {
            assert_eq!(calculator.delay_for(&policy, 10), Duration::from_millis(1_000));
        }
    }

    #[test]
    fn test_schedule_covers_each_retry_gap() {
        let calculator = BackoffCalculator::default();
        let policy = policy().with_jitter(false).with_max_attempts(3);

        assert_eq!(
            calculator.schedule(&policy),
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
        assert!(calculator.schedule(&RetryPolicy::no_retry()).is_empty());
    }
}
