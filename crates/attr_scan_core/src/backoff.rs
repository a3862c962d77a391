use std::time::Duration;

use rand::Rng;

pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const JITTER_FRACTION: f64 = 0.1;

/// Exponential backoff table for transient page failures.
///
/// `max_attempts` bounds the total number of requests for one page,
/// including the first. The delay before retry `n` (after `n` failed
/// attempts) is `min(initial_delay * 2^(n-1), max_delay)`, optionally
/// spread by ±10% jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            jitter: true,
        }
    }
}

impl BackoffPolicy {
    pub fn with_max_attempts(self, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..self
        }
    }

    /// Retries immediately; intended for fakes and tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_attempts,
            jitter: false,
        }
    }

    /// Un-jittered delay after `failed_attempts` failures, or `None` once the
    /// attempt bound is exhausted.
    pub fn base_delay(&self, failed_attempts: u32) -> Option<Duration> {
        if failed_attempts == 0 || failed_attempts >= self.max_attempts {
            return None;
        }
        let factor = 1u32
            .checked_shl(failed_attempts - 1)
            .unwrap_or(u32::MAX);
        Some(self.initial_delay.saturating_mul(factor).min(self.max_delay))
    }

    pub fn delay_after(&self, failed_attempts: u32) -> Option<Duration> {
        let base = self.base_delay(failed_attempts)?;
        if !self.jitter || base.is_zero() {
            return Some(base);
        }
        let spread = rand::thread_rng().gen_range(-JITTER_FRACTION..=JITTER_FRACTION);
        Some(base.mul_f64(1.0 + spread))
    }

    /// Full retry schedule: entry `i` is the delay before attempt `i + 2`.
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts)
            .filter_map(|attempt| self.base_delay(attempt))
            .collect()
    }
}
