//! L1 in-process cache
//!
//! Bounded Moka cache keyed by [`CacheKey`]. Capacity bounding and
//! LRU-style eviction come from Moka; TTL is enforced here by checking each
//! entry's stored-at timestamp against the injected clock on read, so
//! per-namespace TTLs and deterministic expiry tests both work. Expired
//! entries are lazily evicted on read.

use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::clock::Clock;
use crate::entry::CacheEntry;
use crate::key::CacheKey;

pub struct MemoryCache<V> {
    inner: Cache<CacheKey, CacheEntry<V>>,
    clock: Arc<dyn Clock>,
}

impl<V: Send + Sync + 'static> MemoryCache<V> {
    pub fn new(max_capacity: u64, clock: Arc<dyn Clock>) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_capacity)
            .support_invalidation_closures()
            .build();
        Self { inner, clock }
    }

    /// Returns the entry if present and unexpired; an expired entry is
    /// evicted and reported as absent.
    pub async fn get(&self, key: &CacheKey) -> Option<CacheEntry<V>> {
        let entry = self.inner.get(key).await?;
        if entry.is_fresh(self.clock.now_ms()) {
            Some(entry)
        } else {
            self.inner.invalidate(key).await;
            None
        }
    }

    /// Returns the entry even when expired. Diagnostic use only.
    pub async fn peek(&self, key: &CacheKey) -> Option<CacheEntry<V>> {
        self.inner.get(key).await
    }

    /// Stores a fresh value, resetting its stored-at timestamp.
    pub async fn set(&self, key: CacheKey, value: Arc<V>, ttl: Duration) {
        let entry = CacheEntry::new(value, self.clock.now_ms(), ttl);
        self.inner.insert(key, entry).await;
    }

    /// Stores an entry as-is, keeping its original stored-at timestamp.
    /// Used when promoting from L2 so the TTL remainder is preserved.
    pub async fn insert_entry(&self, key: CacheKey, entry: CacheEntry<V>) {
        self.inner.insert(key, entry).await;
    }

    pub async fn invalidate(&self, key: &CacheKey) {
        self.inner.invalidate(key).await;
    }

    /// Removes every entry in a namespace. Constant-time registration; Moka
    /// applies the predicate lazily on access.
    pub fn invalidate_namespace(&self, org: &str, namespace: &str) {
        let (o, n) = (org.to_owned(), namespace.to_owned());
        if let Err(e) = self
            .inner
            .invalidate_entries_if(move |key, _| key.matches_namespace(&o, &n))
        {
            warn!(
                "L1 namespace invalidation failed for {}:{}: {}",
                org, namespace, e
            );
        }
    }

    /// Removes every parameterized variant of a resource.
    pub fn invalidate_resource(&self, org: &str, namespace: &str, resource: &str) {
        let (o, n, r) = (org.to_owned(), namespace.to_owned(), resource.to_owned());
        if let Err(e) = self
            .inner
            .invalidate_entries_if(move |key, _| key.matches_resource(&o, &n, &r))
        {
            warn!(
                "L1 resource invalidation failed for {}:{}:{}: {}",
                org, namespace, resource, e
            );
        }
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    #[cfg(test)]
    async fn run_pending_tasks(&self) {
        self.inner.run_pending_tasks().await;
    }
}
