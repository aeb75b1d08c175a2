//! Retry delays for failed pushes

use std::time::Duration;

use rand::Rng;

use crate::config::SyncConfig;

/// Exponential backoff with a cap and uniform jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: Duration,
}

impl Backoff {
    pub const fn new(base: Duration, max: Duration, jitter: Duration) -> Self {
        Self { base, max, jitter }
    }

    pub const fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.backoff_base, config.backoff_max, config.backoff_jitter)
    }

    /// `min(max, base * 2^(attempt - 1))`, without jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1 << exponent)
            .map_or(self.max, |delay| delay.min(self.max))
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter.is_zero() {
            return base;
        }
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        base + Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms.max(1)))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}
