//! Restart delay policy.
use std::time::Duration;

/// Exponential backoff keyed on a service's consecutive failure count.
///
/// `delay(n) = min(base * 2^min(n, cap_exponent), max_delay)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max_delay: Duration,
    pub cap_exponent: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            cap_exponent: 6,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, max_delay: Duration, cap_exponent: u32) -> Self {
        Self {
            base,
            max_delay,
            cap_exponent,
        }
    }

    /// Delay to wait before the next start after `failures` consecutive failures.
    pub fn delay(&self, failures: u32) -> Duration {
        let exponent = failures.min(self.cap_exponent).min(63);
        let multiplier = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.base
            .checked_mul(multiplier)
            .unwrap_or(Duration::MAX)
            .min(self.max_delay)
    }
}
