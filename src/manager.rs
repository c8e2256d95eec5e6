//! Tiered cache manager
//!
//! Orchestrates the L1 -> L2 -> origin lookup chain with write-through
//! population, per-namespace TTLs, invalidation across both tiers, and
//! request coalescing: concurrent misses for the same key share a single
//! origin call instead of each hitting the rate-limited upstream.
//!
//! L2 is optional; when absent (or unreachable) the manager runs L1-only
//! and callers never see an error caused by L2 alone.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error};

use crate::clock::{Clock, SystemClock};
use crate::config::{CacheConfig, TtlPolicy};
use crate::entry::{CacheEntry, CacheSource};
use crate::error::{ApiError, CacheError};
use crate::key::{CacheKey, Params};
use crate::memory_cache::MemoryCache;
use crate::redis_cache::RedisCache;

/// Trait for values that can flow through the cache tiers.
pub trait Cacheable: Serialize + DeserializeOwned + Send + Sync + 'static {}
impl<T> Cacheable for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Contract for the distributed L2 tier.
///
/// Implementations are best-effort by construction: connectivity failures
/// degrade to a miss or no-op inside the implementation and never escape
/// these signatures, so the manager proceeds as if the tier were empty.
#[async_trait]
pub trait DistributedCache<V>: Send + Sync {
    /// Returns the entry if present and unexpired; failures read as misses.
    async fn get(&self, key: &CacheKey, now_ms: u64) -> Option<CacheEntry<V>>;
    /// Stores an entry; failures are dropped.
    async fn set(&self, key: &CacheKey, entry: &CacheEntry<V>);
    /// Removes one entry; failures are dropped.
    async fn invalidate(&self, key: &CacheKey);
    /// Removes every key matching a SCAN-style pattern; returns the count.
    async fn invalidate_pattern(&self, pattern: &str) -> u64;
}

/// A fetched value tagged with the tier that served it.
#[derive(Debug)]
pub struct Fetched<V> {
    pub value: Arc<V>,
    pub source: CacheSource,
}

impl<V> Clone for Fetched<V> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            source: self.source,
        }
    }
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    pub l1_entries: u64,
    pub l2_configured: bool,
}

/// Cloneable failure shared with coalesced waiters, preserving the
/// leader's error category.
#[derive(Debug, Clone)]
enum FetchFailure {
    Upstream(ApiError),
    Timeout,
    Cancelled,
    Other(String),
}

impl From<&CacheError> for FetchFailure {
    fn from(e: &CacheError) -> Self {
        match e {
            CacheError::Upstream(api) => FetchFailure::Upstream(api.clone()),
            CacheError::Timeout => FetchFailure::Timeout,
            CacheError::Coalesced(msg) => FetchFailure::Other(msg.clone()),
        }
    }
}

impl From<FetchFailure> for CacheError {
    fn from(f: FetchFailure) -> Self {
        match f {
            FetchFailure::Upstream(api) => CacheError::Upstream(api),
            FetchFailure::Timeout => CacheError::Timeout,
            FetchFailure::Cancelled => {
                CacheError::Coalesced("in-flight fetch was cancelled".to_owned())
            }
            FetchFailure::Other(msg) => CacheError::Coalesced(msg),
        }
    }
}

type FlightResult<V> = Option<Result<Arc<V>, FetchFailure>>;
type FlightMap<V> = Arc<Mutex<HashMap<CacheKey, watch::Receiver<FlightResult<V>>>>>;

/// The leading fetch's hold on its registry slot.
///
/// Completion deregisters the key *before* publishing the result, so a
/// settled flight is never observable in the registry: later fetches for
/// the key always walk the tiers (and loader) afresh, which is what lets
/// TTL expiry, invalidation, and error recovery take effect. Dropping
/// without `complete` (panic, cancelled deadline) deregisters too and
/// notifies waiters with a cancellation error.
struct InFlightGuard<V> {
    key: CacheKey,
    in_flight: FlightMap<V>,
    tx: Option<watch::Sender<FlightResult<V>>>,
}

impl<V> InFlightGuard<V> {
    fn new(key: CacheKey, in_flight: FlightMap<V>, tx: watch::Sender<FlightResult<V>>) -> Self {
        Self {
            key,
            in_flight,
            tx: Some(tx),
        }
    }

    fn complete(mut self, result: Result<Arc<V>, FetchFailure>) {
        self.deregister();
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Some(result));
        }
    }

    fn deregister(&self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.key);
    }
}

impl<V> Drop for InFlightGuard<V> {
    fn drop(&mut self) {
        self.deregister();
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Some(Err(FetchFailure::Cancelled)));
        }
    }
}

/// Outcome of the registration lookup: lead the fetch or follow one.
enum FlightRole<V> {
    Leader(InFlightGuard<V>),
    Follower(watch::Receiver<FlightResult<V>>),
}

struct ManagerInner<V> {
    l1: MemoryCache<V>,
    l2: Option<Arc<dyn DistributedCache<V>>>,
    ttl_policy: TtlPolicy,
    clock: Arc<dyn Clock>,
    in_flight: FlightMap<V>,
}

/// Tiered cache manager. Cheap to clone; clones share all state.
pub struct CacheManager<V: Cacheable> {
    inner: Arc<ManagerInner<V>>,
}

impl<V: Cacheable> Clone for CacheManager<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: Cacheable> CacheManager<V> {
    /// Builds a manager with the system clock. Pass `None` for `l2` to run
    /// L1-only.
    pub fn new(config: CacheConfig, l2: Option<RedisCache>) -> Self {
        Self::with_clock(config, l2, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CacheConfig, l2: Option<RedisCache>, clock: Arc<dyn Clock>) -> Self {
        Self::with_l2(
            config,
            l2.map(|redis| Arc::new(redis) as Arc<dyn DistributedCache<V>>),
            clock,
        )
    }

    /// Builds a manager over any distributed-tier implementation.
    pub fn with_l2(
        config: CacheConfig,
        l2: Option<Arc<dyn DistributedCache<V>>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                l1: MemoryCache::new(config.l1_max_capacity, Arc::clone(&clock)),
                l2,
                ttl_policy: config.ttl_policy,
                clock,
                in_flight: Arc::new(Mutex::new(HashMap::new())),
            }),
        }
    }

    /// Fetches through L1 -> L2 -> origin. The loader runs only on a full
    /// miss, at most once per key across concurrent callers; everyone else
    /// awaits the shared result.
    pub async fn fetch<F, Fut>(
        &self,
        org: &str,
        namespace: &str,
        resource_id: &str,
        params: &Params,
        loader: F,
    ) -> Result<Fetched<V>, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, ApiError>>,
    {
        let key = CacheKey::new(org, namespace, resource_id, params);
        self.fetch_key(key, loader).await
    }

    /// Like [`fetch`](Self::fetch), but gives up with [`CacheError::Timeout`]
    /// once `deadline` elapses. A timed-out leading fetch notifies its
    /// waiters and releases the in-flight slot; cache state is untouched.
    pub async fn fetch_with_deadline<F, Fut>(
        &self,
        org: &str,
        namespace: &str,
        resource_id: &str,
        params: &Params,
        loader: F,
        deadline: Duration,
    ) -> Result<Fetched<V>, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, ApiError>>,
    {
        let key = CacheKey::new(org, namespace, resource_id, params);
        match tokio::time::timeout(deadline, self.fetch_key(key, loader)).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout),
        }
    }

    async fn fetch_key<F, Fut>(&self, key: CacheKey, loader: F) -> Result<Fetched<V>, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, ApiError>>,
    {
        // L1: never touches the network.
        if let Some(entry) = self.inner.l1.get(&key).await {
            debug!("Cache hit L1 for key: {}", key);
            return Ok(Fetched {
                value: entry.value,
                source: CacheSource::L1,
            });
        }
        debug!("Cache miss L1 for key: {}", key);

        // L2: best-effort, promoted into L1 with its TTL remainder intact.
        if let Some(l2) = &self.inner.l2 {
            if let Some(entry) = l2.get(&key, self.inner.clock.now_ms()).await {
                debug!("Cache hit L2 for key: {}", key);
                self.inner.l1.insert_entry(key.clone(), entry.clone()).await;
                return Ok(Fetched {
                    value: entry.value,
                    source: CacheSource::L2,
                });
            }
            debug!("Cache miss L2 for key: {}", key);
        }

        // Full miss: coalesce with any in-flight fetch for this key. The
        // registry lock covers only this lookup/registration, never an await.
        let role = {
            let mut in_flight = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(rx) = in_flight.get(&key) {
                FlightRole::Follower(rx.clone())
            } else {
                let (tx, rx) = watch::channel(None);
                in_flight.insert(key.clone(), rx);
                FlightRole::Leader(InFlightGuard::new(
                    key.clone(),
                    Arc::clone(&self.inner.in_flight),
                    tx,
                ))
            }
        };
        let guard = match role {
            FlightRole::Follower(rx) => {
                debug!("Awaiting in-flight origin fetch for key: {}", key);
                return Self::await_flight(rx).await;
            }
            FlightRole::Leader(guard) => guard,
        };

        let result = match loader().await {
            Ok(value) => {
                let ttl = self.inner.ttl_policy.ttl_for(key.namespace());
                let entry =
                    CacheEntry::new(Arc::new(value), self.inner.clock.now_ms(), ttl);
                // Write-through: L2 first (best-effort), then L1.
                if let Some(l2) = &self.inner.l2 {
                    l2.set(&key, &entry).await;
                }
                self.inner.l1.insert_entry(key.clone(), entry.clone()).await;
                debug!("Cache fill from origin for key: {} (ttl={:?})", key, ttl);
                Ok(Fetched {
                    value: entry.value,
                    source: CacheSource::Origin,
                })
            }
            Err(e) => {
                error!("Origin fetch failed for key {}: {}", key, e);
                Err(CacheError::Upstream(e))
            }
        };

        guard.complete(match &result {
            Ok(fetched) => Ok(Arc::clone(&fetched.value)),
            Err(e) => Err(FetchFailure::from(e)),
        });
        result
    }

    async fn await_flight(
        mut rx: watch::Receiver<FlightResult<V>>,
    ) -> Result<Fetched<V>, CacheError> {
        loop {
            {
                let current = rx.borrow();
                if let Some(result) = current.as_ref() {
                    return match result {
                        Ok(value) => Ok(Fetched {
                            value: Arc::clone(value),
                            source: CacheSource::Origin,
                        }),
                        Err(failure) => Err(failure.clone().into()),
                    };
                }
            }
            if rx.changed().await.is_err() {
                return Err(FetchFailure::Cancelled.into());
            }
        }
    }

    /// Removes matching entries from both tiers. With a resource id, every
    /// parameterized variant of that resource goes; without one, the whole
    /// namespace goes. L2 removal is best-effort.
    pub async fn invalidate(&self, org: &str, namespace: &str, resource_id: Option<&str>) {
        match resource_id {
            Some(resource) => {
                debug!("Invalidating {}:{}:{} in both tiers", org, namespace, resource);
                self.inner.l1.invalidate_resource(org, namespace, resource);
                if let Some(l2) = &self.inner.l2 {
                    let exact = CacheKey::new(org, namespace, resource, &Params::new());
                    l2.invalidate(&exact).await;
                    l2.invalidate_pattern(&CacheKey::resource_pattern(org, namespace, resource))
                        .await;
                }
            }
            None => {
                debug!("Invalidating namespace {}:{} in both tiers", org, namespace);
                self.inner.l1.invalidate_namespace(org, namespace);
                if let Some(l2) = &self.inner.l2 {
                    l2.invalidate_pattern(&CacheKey::namespace_pattern(org, namespace))
                        .await;
                }
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            l1_entries: self.inner.l1.entry_count(),
            l2_configured: self.inner.l2.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_clock::ManualClock;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn manager() -> CacheManager<String> {
        CacheManager::new(CacheConfig::default(), None)
    }

    fn manager_with_clock() -> (CacheManager<String>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let mgr = CacheManager::with_clock(CacheConfig::default(), None, clock.clone());
        (mgr, clock)
    }

    fn in_flight_len(mgr: &CacheManager<String>) -> usize {
        mgr.inner.in_flight.lock().unwrap().len()
    }

    #[tokio::test]
    async fn miss_then_hit_with_origin_tags() {
        let mgr = manager();
        let calls = Arc::new(AtomicU32::new(0));

        let loader_calls = Arc::clone(&calls);
        let first = mgr
            .fetch("o1", "schema", "profile_store", &Params::new(), move || async move {
                loader_calls.fetch_add(1, Ordering::SeqCst);
                Ok("schema-v1".to_owned())
            })
            .await
            .unwrap();
        assert_eq!(first.source, CacheSource::Origin);
        assert_eq!(*first.value, "schema-v1");

        let loader_calls = Arc::clone(&calls);
        let second = mgr
            .fetch("o1", "schema", "profile_store", &Params::new(), move || async move {
                loader_calls.fetch_add(1, Ordering::SeqCst);
                Ok("schema-v2".to_owned())
            })
            .await
            .unwrap();
        assert_eq!(second.source, CacheSource::L1);
        assert_eq!(*second.value, "schema-v1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expiry_reloads_from_origin() {
        let (mgr, clock) = manager_with_clock();
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..2 {
            let loader_calls = Arc::clone(&calls);
            mgr.fetch("o1", "schema", "r", &Params::new(), move || async move {
                loader_calls.fetch_add(1, Ordering::SeqCst);
                Ok("v".to_owned())
            })
            .await
            .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Default policy gives "schema" a 3600s TTL.
        clock.advance(Duration::from_secs(3601));
        let loader_calls = Arc::clone(&calls);
        let fetched = mgr
            .fetch("o1", "schema", "r", &Params::new(), move || async move {
                loader_calls.fetch_add(1, Ordering::SeqCst);
                Ok("v2".to_owned())
            })
            .await
            .unwrap();
        assert_eq!(fetched.source, CacheSource::Origin);
        assert_eq!(*fetched.value, "v2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_misses_coalesce_into_one_origin_call() {
        let mgr = manager();
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let mgr = mgr.clone();
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                mgr.fetch("o1", "feature-stats", "age", &Params::new(), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok("stats".to_owned())
                })
                .await
            }));
        }

        for handle in handles {
            let fetched = handle.await.unwrap().unwrap();
            assert_eq!(*fetched.value, "stats");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn in_flight_slot_is_released_before_the_result_returns() {
        let mgr = manager();

        mgr.fetch("o1", "schema", "r", &Params::new(), || async { Ok("v".to_owned()) })
            .await
            .unwrap();
        assert_eq!(in_flight_len(&mgr), 0);

        mgr.fetch("o1", "schema", "fails", &Params::new(), || async {
            Err::<String, _>(ApiError::UpstreamRejected {
                status: 400,
                body: "bad".to_owned(),
            })
        })
        .await
        .unwrap_err();
        assert_eq!(in_flight_len(&mgr), 0);
    }

    #[tokio::test]
    async fn loader_errors_propagate_and_are_not_cached() {
        let mgr = manager();

        let err = mgr
            .fetch("o1", "schema", "r", &Params::new(), || async {
                Err::<String, _>(ApiError::UpstreamRejected {
                    status: 401,
                    body: "bad token".to_owned(),
                })
            })
            .await
            .unwrap_err();
        match err {
            CacheError::Upstream(ApiError::UpstreamRejected { status, .. }) => {
                assert_eq!(status, 401)
            }
            other => panic!("expected UpstreamRejected, got {other:?}"),
        }

        // The failure must not poison the key.
        let fetched = mgr
            .fetch("o1", "schema", "r", &Params::new(), || async {
                Ok("recovered".to_owned())
            })
            .await
            .unwrap();
        assert_eq!(fetched.source, CacheSource::Origin);
    }

    #[tokio::test]
    async fn waiters_receive_the_leaders_error_category() {
        let mgr = manager();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let mgr = mgr.clone();
            handles.push(tokio::spawn(async move {
                mgr.fetch("o1", "schema", "shared-fail", &Params::new(), || async {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    Err::<String, _>(ApiError::UpstreamUnavailable {
                        attempts: 3,
                        last_error: "503".to_owned(),
                    })
                })
                .await
            }));
        }

        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert!(
                matches!(
                    err,
                    CacheError::Upstream(ApiError::UpstreamUnavailable { .. })
                ),
                "unexpected error: {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn deadline_surfaces_timeout_without_poisoning_the_key() {
        let mgr = manager();

        let err = mgr
            .fetch_with_deadline(
                "o1",
                "schema",
                "slow",
                &Params::new(),
                || async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok("never".to_owned())
                },
                Duration::from_millis(20),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Timeout));

        // The timed-out leader released its slot on the way out; the next
        // fetch starts fresh immediately.
        assert_eq!(in_flight_len(&mgr), 0);
        let fetched = mgr
            .fetch("o1", "schema", "slow", &Params::new(), || async {
                Ok("fast".to_owned())
            })
            .await
            .unwrap();
        assert_eq!(fetched.source, CacheSource::Origin);
        assert_eq!(*fetched.value, "fast");
    }

    /// Simulates an unreachable Redis: every operation fails internally and
    /// degrades to miss/no-op, as the tier contract requires.
    #[derive(Default)]
    struct DownL2 {
        gets: AtomicU32,
        sets: AtomicU32,
        invalidations: AtomicU32,
    }

    #[async_trait]
    impl DistributedCache<String> for DownL2 {
        async fn get(&self, _key: &CacheKey, _now_ms: u64) -> Option<CacheEntry<String>> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            None
        }

        async fn set(&self, _key: &CacheKey, _entry: &CacheEntry<String>) {
            self.sets.fetch_add(1, Ordering::SeqCst);
        }

        async fn invalidate(&self, _key: &CacheKey) {
            self.invalidations.fetch_add(1, Ordering::SeqCst);
        }

        async fn invalidate_pattern(&self, _pattern: &str) -> u64 {
            self.invalidations.fetch_add(1, Ordering::SeqCst);
            0
        }
    }

    #[tokio::test]
    async fn unreachable_l2_never_surfaces_to_callers() {
        let tier = Arc::new(DownL2::default());
        let mgr = CacheManager::<String>::with_l2(
            CacheConfig::default(),
            Some(Arc::clone(&tier) as Arc<dyn DistributedCache<String>>),
            Arc::new(SystemClock),
        );

        // Full miss: L2 get and write-through both fail silently; the
        // caller still gets the origin value.
        let first = mgr
            .fetch("o1", "schema", "r", &Params::new(), || async { Ok("v".to_owned()) })
            .await
            .unwrap();
        assert_eq!(first.source, CacheSource::Origin);
        assert_eq!(tier.gets.load(Ordering::SeqCst), 1);
        assert_eq!(tier.sets.load(Ordering::SeqCst), 1);

        // L1 still serves; the dead L2 is not consulted again.
        let second = mgr
            .fetch("o1", "schema", "r", &Params::new(), || async { Ok("v2".to_owned()) })
            .await
            .unwrap();
        assert_eq!(second.source, CacheSource::L1);
        assert_eq!(tier.gets.load(Ordering::SeqCst), 1);

        // Invalidation completes despite the dead tier.
        mgr.invalidate("o1", "schema", Some("r")).await;
        assert!(tier.invalidations.load(Ordering::SeqCst) > 0);

        let third = mgr
            .fetch("o1", "schema", "r", &Params::new(), || async { Ok("v3".to_owned()) })
            .await
            .unwrap();
        assert_eq!(third.source, CacheSource::Origin);
        assert_eq!(*third.value, "v3");
    }

    #[tokio::test]
    async fn schema_namespace_scenario() {
        // namespace "schema" has TTL 3600s under the default policy
        let (mgr, _clock) = manager_with_clock();
        let calls = Arc::new(AtomicU32::new(0));

        let loader_calls = Arc::clone(&calls);
        let first = mgr
            .fetch("o1", "schema", "profile_store", &Params::new(), move || async move {
                loader_calls.fetch_add(1, Ordering::SeqCst);
                Ok("profile".to_owned())
            })
            .await
            .unwrap();
        assert_eq!(first.source, CacheSource::Origin);

        let loader_calls = Arc::clone(&calls);
        let second = mgr
            .fetch("o1", "schema", "profile_store", &Params::new(), move || async move {
                loader_calls.fetch_add(1, Ordering::SeqCst);
                Ok("profile".to_owned())
            })
            .await
            .unwrap();
        assert_eq!(second.source, CacheSource::L1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn params_produce_distinct_cache_entries() {
        let mgr = manager();
        let calls = Arc::new(AtomicU32::new(0));

        for columns in [serde_json::json!(["a"]), serde_json::json!(["b"])] {
            let mut params = Params::new();
            params.insert("columns".to_owned(), columns);
            let loader_calls = Arc::clone(&calls);
            mgr.fetch("o1", "metadata", "cols", &params, move || async move {
                loader_calls.fetch_add(1, Ordering::SeqCst);
                Ok("meta".to_owned())
            })
            .await
            .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_resource_forces_reload() {
        let mgr = manager();
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..2 {
            let loader_calls = Arc::clone(&calls);
            mgr.fetch("o1", "schema", "r", &Params::new(), move || async move {
                loader_calls.fetch_add(1, Ordering::SeqCst);
                Ok("v".to_owned())
            })
            .await
            .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        mgr.invalidate("o1", "schema", Some("r")).await;

        let loader_calls = Arc::clone(&calls);
        let fetched = mgr
            .fetch("o1", "schema", "r", &Params::new(), move || async move {
                loader_calls.fetch_add(1, Ordering::SeqCst);
                Ok("v2".to_owned())
            })
            .await
            .unwrap();
        assert_eq!(fetched.source, CacheSource::Origin);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_namespace_spares_other_namespaces() {
        let mgr = manager();

        mgr.fetch("o1", "schema", "r", &Params::new(), || async { Ok("s".to_owned()) })
            .await
            .unwrap();
        mgr.fetch("o1", "metadata", "r", &Params::new(), || async { Ok("m".to_owned()) })
            .await
            .unwrap();

        mgr.invalidate("o1", "schema", None).await;

        let schema = mgr
            .fetch("o1", "schema", "r", &Params::new(), || async {
                Ok("s2".to_owned())
            })
            .await
            .unwrap();
        assert_eq!(schema.source, CacheSource::Origin);

        let metadata = mgr
            .fetch("o1", "metadata", "r", &Params::new(), || async {
                Ok("m2".to_owned())
            })
            .await
            .unwrap();
        assert_eq!(metadata.source, CacheSource::L1);
        assert_eq!(*metadata.value, "m");
    }

    #[tokio::test]
    async fn stats_reflect_configuration() {
        let mgr = manager();
        let stats = mgr.stats();
        assert_eq!(stats.l1_entries, 0);
        assert!(!stats.l2_configured);
    }
}
