//! Cache entry metadata

use std::sync::Arc;
use std::time::Duration;

/// Which tier served a fetched value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    L1,
    L2,
    Origin,
}

impl std::fmt::Display for CacheSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CacheSource::L1 => "L1",
            CacheSource::L2 => "L2",
            CacheSource::Origin => "origin",
        })
    }
}

/// A cached value with its freshness metadata.
///
/// An entry past its TTL is treated as absent by the tiers; it is never
/// served unless a caller explicitly peeks at stale state.
#[derive(Debug)]
pub struct CacheEntry<V> {
    pub value: Arc<V>,
    /// Unix milliseconds at which the value was stored
    pub stored_at_ms: u64,
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    pub fn new(value: Arc<V>, stored_at_ms: u64, ttl: Duration) -> Self {
        Self {
            value,
            stored_at_ms,
            ttl,
        }
    }

    pub fn expires_at_ms(&self) -> u64 {
        self.stored_at_ms
            .saturating_add(self.ttl.as_millis() as u64)
    }

    pub fn is_fresh(&self, now_ms: u64) -> bool {
        now_ms < self.expires_at_ms()
    }

    /// TTL remaining at `now_ms`; zero once expired.
    pub fn remaining(&self, now_ms: u64) -> Duration {
        Duration::from_millis(self.expires_at_ms().saturating_sub(now_ms))
    }
}

// Manual impl so `V: Clone` is not required; the payload is Arc-shared.
impl<V> Clone for CacheEntry<V> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            stored_at_ms: self.stored_at_ms,
            ttl: self.ttl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freshness_boundary() {
        let entry = CacheEntry::new(Arc::new("v"), 1_000, Duration::from_millis(500));
        assert!(entry.is_fresh(1_000));
        assert!(entry.is_fresh(1_499));
        assert!(!entry.is_fresh(1_500));
        assert_eq!(entry.remaining(1_200), Duration::from_millis(300));
        assert_eq!(entry.remaining(2_000), Duration::ZERO);
    }
}
