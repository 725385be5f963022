//! Retry policy with linear backoff
//!
//! Attempt `i` (0-indexed) that fails is followed by a sleep of
//! `(i + 1) * base_delay` before attempt `i + 1`. No sleep follows the
//! final attempt.

use std::time::Duration;

/// Default number of retries after the first attempt
pub const DEFAULT_RETRIES: u32 = 3;
/// Default backoff unit
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Total attempts = retries + 1.
    pub retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(retries: u32, base_delay: Duration) -> Self {
        Self { retries, base_delay }
    }

    /// Upper bound on attempts, never exceeded
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Delay to wait after `attempt` (0-indexed) failed
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt.saturating_add(1))
    }
}

/// Blocking delay primitive used between attempts
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the calling thread
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
