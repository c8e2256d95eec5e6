//! Cache and client configuration
//!
//! Plain config structs with defaults; loading them from the environment or
//! files is the embedding service's job.

use std::collections::HashMap;
use std::time::Duration;

/// Per-namespace TTL policy, immutable after startup.
///
/// Namespaces not listed fall back to the default TTL. Defaults follow the
/// freshness classes of the upstream data: schema metadata is long-lived,
/// statistical aggregates are short-lived.
#[derive(Debug, Clone)]
pub struct TtlPolicy {
    default_ttl: Duration,
    ttls: HashMap<String, Duration>,
}

impl TtlPolicy {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            ttls: HashMap::new(),
        }
    }

    pub fn with_namespace(mut self, namespace: &str, ttl: Duration) -> Self {
        self.ttls.insert(namespace.to_owned(), ttl);
        self
    }

    pub fn ttl_for(&self, namespace: &str) -> Duration {
        self.ttls
            .get(namespace)
            .copied()
            .unwrap_or(self.default_ttl)
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(300)) // 5 minutes
            .with_namespace("schema", Duration::from_secs(3600)) // 1 hour
            .with_namespace("metadata", Duration::from_secs(7200)) // 2 hours
    }
}

/// Configuration for the tiered cache
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries in the L1 cache
    pub l1_max_capacity: u64,
    /// Namespace-to-TTL table applied when filling from origin
    pub ttl_policy: TtlPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1_max_capacity: 1000,
            ttl_policy: TtlPolicy::default(),
        }
    }
}

/// Configuration for the resilient API client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bearer token sent with every request; must be non-empty unless
    /// `no_auth` is set (mock mode)
    pub bearer_token: String,
    /// Per-attempt request timeout
    pub timeout: Duration,
    /// Total attempts per request, including the first
    pub max_attempts: u32,
    /// Base delay for exponential backoff
    pub backoff_base: Duration,
    /// Upper bound on a single backoff delay
    pub backoff_cap: Duration,
    /// Jitter as a fraction of the computed delay, in `[0, 1]`
    pub jitter_fraction: f64,
    /// Skip authentication entirely (mock mode)
    pub no_auth: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            bearer_token: String::new(),
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(10),
            jitter_fraction: 0.1,
            no_auth: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_policy_falls_back_to_default() {
        let policy = TtlPolicy::default();
        assert_eq!(policy.ttl_for("schema"), Duration::from_secs(3600));
        assert_eq!(policy.ttl_for("metadata"), Duration::from_secs(7200));
        assert_eq!(policy.ttl_for("feature-stats"), Duration::from_secs(300));
    }

    #[test]
    fn ttl_policy_overrides() {
        let policy = TtlPolicy::new(Duration::from_secs(60))
            .with_namespace("feature-stats", Duration::from_secs(30));
        assert_eq!(policy.ttl_for("feature-stats"), Duration::from_secs(30));
        assert_eq!(policy.ttl_for("anything-else"), Duration::from_secs(60));
    }
}
