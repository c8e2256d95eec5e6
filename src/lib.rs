//! dscache - resilient tiered data access
//!
//! This library is the caching/data-access core of a tool-serving backend
//! that answers schema, feature, query, and compliance questions by calling
//! remote catalog/metadata/warehouse APIs. It provides:
//! - L1: bounded in-memory Moka cache (fastest)
//! - L2: Redis cache (shared across instances, optional, best-effort)
//! - Origin: a retrying, authenticated API client behind a loader callback
//!
//! The cache manager supports:
//! - Automatic fallback between tiers with write-through population
//! - Per-namespace TTLs from an immutable policy table
//! - Request coalescing: one origin call per key across concurrent misses
//! - Invalidation by resource or whole namespace, in both tiers
//! - Caller deadlines surfaced as a distinct timeout error
//!
//! A down or absent Redis never surfaces to callers; the manager degrades
//! to L1-only operation.

mod api_client;
mod backoff;
mod clock;
mod config;
mod entry;
mod error;
mod key;
mod manager;
mod memory_cache;
mod redis_cache;
pub mod schema_cache;

pub use api_client::{ApiClient, ApiResponse, RetryableRequest};
pub use backoff::BackoffPolicy;
pub use clock::{Clock, SystemClock};
pub use config::{CacheConfig, ClientConfig, TtlPolicy};
pub use entry::{CacheEntry, CacheSource};
pub use error::{ApiError, CacheError};
pub use key::{CacheKey, Params};
pub use manager::{CacheManager, CacheStats, Cacheable, DistributedCache, Fetched};
pub use memory_cache::MemoryCache;
pub use redis_cache::RedisCache;
pub use schema_cache::{CatalogBackend, CatalogSchema, SchemaCache};

// Re-export async_trait for backend implementations
pub use async_trait::async_trait;
