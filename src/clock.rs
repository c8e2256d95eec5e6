//! Time source abstraction
//!
//! TTL checks go through a [`Clock`] so expiry behavior can be tested
//! deterministically. Production code uses [`SystemClock`]; tests use a
//! manually advanced clock.

use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock time, in unix milliseconds.
pub trait Clock: Send + Sync + 'static {
    fn now_ms(&self) -> u64;
}

/// System wall clock.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}
