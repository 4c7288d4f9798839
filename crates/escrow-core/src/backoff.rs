//! Exponential backoff schedule.
//!
//! Shared by the ledger client's read retries and caller-level mirroring
//! retries, so both wait the same way between attempts.

use std::time::Duration;

/// How many times to try an operation and how long to wait in between.
///
/// Failed attempt `n` (1-based) waits `base_delay * 2^(n-1)` before the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Total attempts, including the first. Values below 1 are treated as 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200))
    }
}

impl Backoff {
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// A single attempt, no waiting.
    pub const fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay after failed attempt `attempt` (1-based). The exponent is capped
    /// at 16 and the multiplication saturates.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exp)
    }

    /// Whether another attempt follows failed attempt `attempt`.
    pub fn has_next(&self, attempt: u32) -> bool {
        attempt < self.attempts()
    }
}
