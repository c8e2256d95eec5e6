//! L2 distributed cache (Redis)
//!
//! Every operation here is best-effort: a connectivity failure, timeout, or
//! corrupt entry degrades to "miss"/"no-op" and is logged, never propagated.
//! The manager treats a failed L2 exactly like an absent one.
//!
//! Entries are stored as a JSON envelope carrying the payload plus its
//! stored-at timestamp and TTL, so a value promoted from L2 into L1 keeps
//! its TTL remainder. A Redis-side `SET EX` is kept as a backstop so dead
//! entries do not accumulate.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::entry::CacheEntry;
use crate::key::CacheKey;
use crate::manager::{Cacheable, DistributedCache};

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    payload: T,
    stored_at_ms: u64,
    ttl_ms: u64,
}

#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connects to Redis and verifies reachability. Failing here means the
    /// service starts L1-only; it is the one place an L2 error is surfaced.
    pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    /// Wraps an existing connection manager (shared across caches).
    pub fn from_manager(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Returns the entry if present and unexpired. Any Redis failure is a
    /// miss; a corrupt or expired entry is deleted best-effort.
    pub async fn get<V: DeserializeOwned>(
        &self,
        key: &CacheKey,
        now_ms: u64,
    ) -> Option<CacheEntry<V>> {
        let redis_key = key.redis_key();
        let mut conn = self.conn.clone();

        let raw: Option<String> = match conn.get::<_, Option<String>>(&redis_key).await {
            Ok(v) => v,
            Err(e) => {
                warn!(
                    "L2 (Redis) GET error for key {} ({}). Treating as miss.",
                    key, e
                );
                return None;
            }
        };
        let json = raw?;

        match serde_json::from_str::<Envelope<V>>(&json) {
            Ok(env) => {
                let entry = CacheEntry::new(
                    Arc::new(env.payload),
                    env.stored_at_ms,
                    Duration::from_millis(env.ttl_ms),
                );
                if entry.is_fresh(now_ms) {
                    Some(entry)
                } else {
                    self.delete_quietly(&mut conn, &redis_key, "expired").await;
                    None
                }
            }
            Err(e) => {
                warn!(
                    "Failed to deserialize L2 entry for key {}: {}. Deleting corrupt entry.",
                    key, e
                );
                self.delete_quietly(&mut conn, &redis_key, "corrupt").await;
                None
            }
        }
    }

    /// Stores an entry, best-effort.
    pub async fn set<V: Serialize>(&self, key: &CacheKey, entry: &CacheEntry<V>) {
        let envelope = Envelope {
            payload: entry.value.as_ref(),
            stored_at_ms: entry.stored_at_ms,
            ttl_ms: entry.ttl.as_millis() as u64,
        };
        let json = match serde_json::to_string(&envelope) {
            Ok(j) => j,
            Err(e) => {
                warn!("Failed to serialize L2 entry for key {}: {}. Skipping.", key, e);
                return;
            }
        };

        let redis_key = key.redis_key();
        let ttl_secs = entry.ttl.as_secs().max(1);
        let mut conn = self.conn.clone();
        if let Err(e) = conn.set_ex::<_, _, ()>(&redis_key, json, ttl_secs).await {
            warn!(
                "L2 (Redis) SETEX error for key {} ({}). Continuing.",
                key, e
            );
        }
    }

    /// Removes a single entry, best-effort.
    pub async fn invalidate(&self, key: &CacheKey) {
        let mut conn = self.conn.clone();
        if let Err(e) = conn.del::<_, ()>(key.redis_key()).await {
            warn!(
                "L2 (Redis) DEL error for key {} ({}). Continuing.",
                key, e
            );
        }
    }

    /// Removes every key matching a SCAN pattern, best-effort. Returns the
    /// number of keys deleted.
    pub async fn invalidate_pattern(&self, pattern: &str) -> u64 {
        let mut conn = self.conn.clone();
        let mut removed = 0u64;
        let mut cursor = 0u64;
        loop {
            let (next, keys): (u64, Vec<String>) = match redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
            {
                Ok(v) => v,
                Err(e) => {
                    warn!(
                        "L2 (Redis) SCAN error for pattern {} ({}). Continuing.",
                        pattern, e
                    );
                    return removed;
                }
            };
            if !keys.is_empty() {
                match conn.del::<_, u64>(keys).await {
                    Ok(n) => removed += n,
                    Err(e) => {
                        warn!(
                            "L2 (Redis) DEL error for pattern {} ({}). Continuing.",
                            pattern, e
                        );
                    }
                }
            }
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        debug!("L2 removed {} keys matching {}", removed, pattern);
        removed
    }

    async fn delete_quietly(&self, conn: &mut ConnectionManager, redis_key: &str, why: &str) {
        if let Err(e) = conn.del::<_, ()>(redis_key).await {
            warn!(
                "Failed to delete {} L2 entry {} ({}). Continuing.",
                why, redis_key, e
            );
        }
    }
}

#[async_trait]
impl<V: Cacheable> DistributedCache<V> for RedisCache {
    async fn get(&self, key: &CacheKey, now_ms: u64) -> Option<CacheEntry<V>> {
        RedisCache::get(self, key, now_ms).await
    }

    async fn set(&self, key: &CacheKey, entry: &CacheEntry<V>) {
        RedisCache::set(self, key, entry).await
    }

    async fn invalidate(&self, key: &CacheKey) {
        RedisCache::invalidate(self, key).await
    }

    async fn invalidate_pattern(&self, pattern: &str) -> u64 {
        RedisCache::invalidate_pattern(self, pattern).await
    }
}
