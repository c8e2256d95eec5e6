//! Retry backoff policy
//!
//! Pure delay/attempt decisions for the API client: exponential growth from
//! a base delay, capped, with proportional random jitter to avoid retry
//! storms. The jitter input is injectable so delays are deterministic in
//! tests.

use std::time::Duration;

/// Exponential backoff with a cap and proportional jitter.
///
/// Attempts are 1-based. The raw delay for attempt `n` is
/// `min(base * 2^(n-1), cap)`, scaled by a jitter factor in
/// `[1 - jitter_fraction, 1 + jitter_fraction]`.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base: Duration,
    cap: Duration,
    max_attempts: u32,
    jitter_fraction: f64,
}

impl BackoffPolicy {
    pub fn new(base: Duration, cap: Duration, max_attempts: u32, jitter_fraction: f64) -> Self {
        Self {
            base,
            cap,
            max_attempts: max_attempts.max(1),
            jitter_fraction: jitter_fraction.clamp(0.0, 1.0),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// True once the attempt counter has reached the retry budget; no
    /// further delay should be computed.
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }

    /// Delay before the attempt following `attempt`, with random jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with(attempt, fastrand::f64())
    }

    /// Delay with an explicit jitter input in `[0, 1)`.
    ///
    /// `unit = 0.5` yields the undithered exponential delay; 0 and 1 map to
    /// the lower and upper jitter bounds.
    pub fn delay_with(&self, attempt: u32, unit: f64) -> Duration {
        let exp = attempt.saturating_sub(1).min(63);
        let factor = 1u64.checked_shl(exp).unwrap_or(u64::MAX);
        let raw_ms = (self.base.as_millis() as u64).saturating_mul(factor);
        let capped_ms = raw_ms.min(self.cap.as_millis() as u64);

        let spread = self.jitter_fraction * (2.0 * unit.clamp(0.0, 1.0) - 1.0);
        let jittered = (capped_ms as f64 * (1.0 + spread)).max(0.0);
        Duration::from_millis(jittered as u64)
    }
}
