//! Wait strategies between fetch attempts.
//!
//! [`DocumentFetcher`](crate::DocumentFetcher) only asks a strategy two
//! things: how many attempts an index gets, and how long to wait after a
//! given failed attempt. It never waits after the final attempt.

use std::time::Duration;

use harvester_shared::{BackoffKind, HarvestConfig};

/// Attempt budget and inter-attempt delay for one index.
pub trait Backoff: Send + Sync {
    /// Total attempts, including the first. Always at least 1.
    fn max_attempts(&self) -> u32;

    /// Wait after failed attempt number `failed_attempt` (1-based).
    fn delay(&self, failed_attempt: u32) -> Duration;
}

/// Same wait after every failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay {
    attempts: u32,
    delay: Duration,
}

impl FixedDelay {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }
}

impl Default for FixedDelay {
    /// Three attempts, two seconds apart.
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

impl Backoff for FixedDelay {
    fn max_attempts(&self) -> u32 {
        self.attempts
    }

    fn delay(&self, _failed_attempt: u32) -> Duration {
        self.delay
    }
}

/// Doubling wait, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    attempts: u32,
    initial: Duration,
    max_delay: Duration,
}

impl ExponentialBackoff {
    pub fn new(attempts: u32, initial: Duration, max_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            initial,
            max_delay,
        }
    }
}

impl Backoff for ExponentialBackoff {
    fn max_attempts(&self) -> u32 {
        self.attempts
    }

    fn delay(&self, failed_attempt: u32) -> Duration {
        let exp = failed_attempt.saturating_sub(1).min(31);
        self.initial
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }
}

/// Build the strategy selected in the runtime config.
pub fn backoff_from_config(config: &HarvestConfig) -> Box<dyn Backoff> {
    match config.backoff {
        BackoffKind::Fixed => Box::new(FixedDelay::new(config.max_attempts, config.retry_delay)),
        BackoffKind::Exponential => Box::new(ExponentialBackoff::new(
            config.max_attempts,
            config.retry_delay,
            config.max_retry_delay,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvester_shared::AppConfig;

    #[test]
    fn fixed_default_shape() {
        let backoff = FixedDelay::default();
        assert_eq!(backoff.max_attempts(), 3);
        assert_eq!(backoff.delay(1), Duration::from_secs(2));
        assert_eq!(backoff.delay(2), Duration::from_secs(2));
    }

    #[test]
    fn attempts_never_zero() {
        assert_eq!(FixedDelay::new(0, Duration::ZERO).max_attempts(), 1);
        assert_eq!(
            ExponentialBackoff::new(0, Duration::ZERO, Duration::ZERO).max_attempts(),
            1
        );
    }

    #[test]
    fn exponential_doubles_and_caps() {
        let backoff =
            ExponentialBackoff::new(6, Duration::from_secs(1), Duration::from_secs(5));
        let delays: Vec<u64> = (1..=5).map(|a| backoff.delay(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5]);
    }

    #[test]
    fn exponential_survives_huge_attempt_numbers() {
        let backoff =
            ExponentialBackoff::new(3, Duration::from_secs(1), Duration::from_secs(60));
        assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn config_selects_strategy() {
        let mut app = AppConfig::default();
        let fixed = backoff_from_config(&HarvestConfig::from(&app));
        assert_eq!(fixed.delay(3), Duration::from_secs(2));

        app.retry.strategy = BackoffKind::Exponential;
        let exp = backoff_from_config(&HarvestConfig::from(&app));
        assert_eq!(exp.delay(3), Duration::from_secs(8));
    }
}
