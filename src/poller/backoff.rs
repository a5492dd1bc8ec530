//! Delay policy between poll cycles.

use std::time::Duration;

use crate::config::PollerConfig;

/// Exponential backoff after consecutive failures
///
/// `base * 2^min(failures - 1, max_exponent)`, never above `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    pub max_exponent: u32,
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration, max_exponent: u32) -> Self {
        Self {
            base,
            max,
            max_exponent,
        }
    }

    /// Delay after `failures` consecutive failures (the first failure counts as 1)
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(self.max_exponent);
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

/// Delays between successful cycles plus the failure backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    /// Used when a cycle found events or the broker reported more pending
    pub success_delay: Duration,
    /// Used after an empty cycle
    pub idle_delay: Duration,
    pub backoff: BackoffPolicy,
}

impl PollSchedule {
    pub fn from_config(config: &PollerConfig) -> Self {
        Self {
            success_delay: config.success_delay(),
            idle_delay: config.idle_delay(),
            backoff: BackoffPolicy::new(
                Duration::from_millis(config.backoff_base_ms),
                Duration::from_millis(config.backoff_max_ms),
                config.backoff_max_exponent,
            ),
        }
    }

    pub fn next_delay(&self, found_events: bool, has_more: bool) -> Duration {
        if found_events || has_more {
            self.success_delay
        } else {
            self.idle_delay
        }
    }
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self::from_config(&PollerConfig::default())
    }
}
