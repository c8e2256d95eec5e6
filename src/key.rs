//! Cache key construction
//!
//! Keys are composed of organization, logical namespace, resource id, and an
//! optional fingerprint of the request parameters, so that two logically
//! distinct requests never collide and two identical requests always map to
//! the same key.
//!
//! ## Cache keys
//!
//! - L2 (Redis): `cache:{org}:{namespace}:{resource}[:{fingerprint}]`

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// Request parameters folded into the key fingerprint.
pub type Params = serde_json::Map<String, Value>;

/// Composite cache key for one cached upstream response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    org: String,
    namespace: String,
    resource: String,
    fingerprint: Option<String>,
}

impl CacheKey {
    /// Build a key from its parts. Empty params contribute no fingerprint
    /// segment; non-empty params are hashed over their canonical JSON form
    /// (`serde_json::Map` keeps keys sorted, so serialization is stable).
    pub fn new(org: &str, namespace: &str, resource: &str, params: &Params) -> Self {
        let fingerprint = if params.is_empty() {
            None
        } else {
            let canonical = Value::Object(params.clone()).to_string();
            let digest = Sha256::digest(canonical.as_bytes());
            Some(hex::encode(digest))
        };
        Self {
            org: org.to_owned(),
            namespace: namespace.to_owned(),
            resource: resource.to_owned(),
            fingerprint,
        }
    }

    pub fn org(&self) -> &str {
        &self.org
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// The L2 (Redis) key for this entry.
    pub fn redis_key(&self) -> String {
        match &self.fingerprint {
            Some(fp) => format!(
                "cache:{}:{}:{}:{}",
                self.org, self.namespace, self.resource, fp
            ),
            None => format!("cache:{}:{}:{}", self.org, self.namespace, self.resource),
        }
    }

    /// SCAN pattern matching every L2 key in a namespace.
    pub fn namespace_pattern(org: &str, namespace: &str) -> String {
        format!("cache:{org}:{namespace}:*")
    }

    /// SCAN pattern matching every parameterized variant of a resource.
    pub fn resource_pattern(org: &str, namespace: &str, resource: &str) -> String {
        format!("cache:{org}:{namespace}:{resource}:*")
    }

    pub fn matches_namespace(&self, org: &str, namespace: &str) -> bool {
        self.org == org && self.namespace == namespace
    }

    pub fn matches_resource(&self, org: &str, namespace: &str, resource: &str) -> bool {
        self.matches_namespace(org, namespace) && self.resource == resource
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.org, self.namespace, self.resource)?;
        if let Some(fp) = &self.fingerprint {
            // Abbreviated in logs; the full digest is part of the key.
            write!(f, ":{}", &fp[..12.min(fp.len())])?;
        }
        Ok(())
    }
}
