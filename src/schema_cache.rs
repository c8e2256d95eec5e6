//! Catalog schema cache
//!
//! Typed wrapper over the generic [`CacheManager`] for per-organization
//! catalog schemas: the tool handlers' entry point for schema questions.
//! The origin fetch goes through a [`CatalogBackend`], usually the
//! HTTP-backed implementation calling the catalog search API via the
//! resilient client.
//!
//! ## Cache keys
//!
//! - L2 (Redis): `cache:{org}:schema:catalog`

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::api_client::{ApiClient, RetryableRequest};
use crate::config::CacheConfig;
use crate::error::{ApiError, CacheError};
use crate::key::Params;
use crate::manager::CacheManager;
use crate::redis_cache::RedisCache;

const NAMESPACE: &str = "schema";
const RESOURCE: &str = "catalog";

/// One catalog attribute as returned by the catalog search API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaAttribute {
    pub name: String,
    pub data_type: String,
    pub attribute_type: String,
    #[serde(rename = "isRawPII", default)]
    pub is_raw_pii: bool,
}

/// The full catalog schema for one organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSchema {
    pub org_id: String,
    pub attributes: Vec<SchemaAttribute>,
    pub total_count: u64,
}

impl CatalogSchema {
    /// Attributes of a given type (e.g. "DEMOGRAPHIC", "CONSENT").
    pub fn attributes_of_type<'a>(
        &'a self,
        attribute_type: &'a str,
    ) -> impl Iterator<Item = &'a SchemaAttribute> {
        self.attributes
            .iter()
            .filter(move |a| a.attribute_type == attribute_type)
    }

    /// Attributes flagged as raw PII.
    pub fn pii_attributes(&self) -> impl Iterator<Item = &SchemaAttribute> {
        self.attributes.iter().filter(|a| a.is_raw_pii)
    }
}

/// Trait for fetching a catalog schema from the origin.
#[async_trait]
pub trait CatalogBackend: Send + Sync + 'static {
    async fn fetch_schema(&self, org_id: &str) -> Result<CatalogSchema, ApiError>;
}

/// Catalog backend calling the catalog search API through the resilient
/// client. The URL template carries an `{org_id}` placeholder.
pub struct HttpCatalogBackend {
    client: Arc<ApiClient>,
    url_template: String,
}

impl HttpCatalogBackend {
    pub fn new(client: Arc<ApiClient>, url_template: impl Into<String>) -> Self {
        Self {
            client,
            url_template: url_template.into(),
        }
    }
}

#[async_trait]
impl CatalogBackend for HttpCatalogBackend {
    async fn fetch_schema(&self, org_id: &str) -> Result<CatalogSchema, ApiError> {
        if org_id.is_empty() {
            return Err(ApiError::InvalidRequest(
                "organization id is required".to_owned(),
            ));
        }
        let url = self.url_template.replace("{org_id}", org_id);
        let body = serde_json::json!({
            "fetchGroup": "COMPLETE_CATALOG_ATTR",
            "sortField": "ATTRIBUTE_NAME",
            "sortOrder": "ASC",
        });
        let response = self
            .client
            .execute(RetryableRequest::new(Method::POST, url).with_body(body))
            .await?;

        let attributes: Vec<SchemaAttribute> = match response.body.get("attributes") {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| ApiError::Decode(e.to_string()))?,
            None => Vec::new(),
        };
        let total_count = response
            .body
            .get("count")
            .and_then(|v| v.as_u64())
            .unwrap_or(attributes.len() as u64);

        Ok(CatalogSchema {
            org_id: org_id.to_owned(),
            attributes,
            total_count,
        })
    }
}

/// Per-organization catalog schema cache.
pub struct SchemaCache<B: CatalogBackend> {
    manager: CacheManager<CatalogSchema>,
    backend: Arc<B>,
}

impl<B: CatalogBackend> Clone for SchemaCache<B> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<B: CatalogBackend> SchemaCache<B> {
    pub fn new(config: CacheConfig, l2: Option<RedisCache>, backend: B) -> Self {
        Self {
            manager: CacheManager::new(config, l2),
            backend: Arc::new(backend),
        }
    }

    /// Gets the schema for an organization through the cache tiers.
    pub async fn get(&self, org_id: &str) -> Result<Arc<CatalogSchema>, CacheError> {
        let backend = Arc::clone(&self.backend);
        let org = org_id.to_owned();
        let fetched = self
            .manager
            .fetch(org_id, NAMESPACE, RESOURCE, &Params::new(), move || async move {
                backend.fetch_schema(&org).await
            })
            .await?;
        Ok(fetched.value)
    }

    /// Like [`get`](Self::get), with a caller deadline.
    pub async fn get_with_deadline(
        &self,
        org_id: &str,
        deadline: Duration,
    ) -> Result<Arc<CatalogSchema>, CacheError> {
        let backend = Arc::clone(&self.backend);
        let org = org_id.to_owned();
        let fetched = self
            .manager
            .fetch_with_deadline(
                org_id,
                NAMESPACE,
                RESOURCE,
                &Params::new(),
                move || async move { backend.fetch_schema(&org).await },
                deadline,
            )
            .await?;
        Ok(fetched.value)
    }

    /// Drops the cached schema for an organization from both tiers. Used
    /// when the upstream catalog is known to have changed.
    pub async fn invalidate(&self, org_id: &str) {
        self.manager.invalidate(org_id, NAMESPACE, None).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct MockBackend {
        calls: AtomicU32,
    }

    #[async_trait]
    impl CatalogBackend for MockBackend {
        async fn fetch_schema(&self, org_id: &str) -> Result<CatalogSchema, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CatalogSchema {
                org_id: org_id.to_owned(),
                attributes: vec![
                    SchemaAttribute {
                        name: "email".to_owned(),
                        data_type: "STRING".to_owned(),
                        attribute_type: "IDENTITY".to_owned(),
                        is_raw_pii: true,
                    },
                    SchemaAttribute {
                        name: "age".to_owned(),
                        data_type: "INTEGER".to_owned(),
                        attribute_type: "DEMOGRAPHIC".to_owned(),
                        is_raw_pii: false,
                    },
                ],
                total_count: 2,
            })
        }
    }

    fn cache() -> SchemaCache<MockBackend> {
        SchemaCache::new(
            CacheConfig::default(),
            None,
            MockBackend {
                calls: AtomicU32::new(0),
            },
        )
    }

    #[tokio::test]
    async fn repeated_gets_hit_the_backend_once() {
        let cache = cache();
        let first = cache.get("o1").await.unwrap();
        let second = cache.get("o1").await.unwrap();
        assert_eq!(first.org_id, "o1");
        assert_eq!(second.attributes.len(), 2);
        assert_eq!(cache.backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn organizations_are_cached_independently() {
        let cache = cache();
        cache.get("o1").await.unwrap();
        cache.get("o2").await.unwrap();
        assert_eq!(cache.backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_a_fresh_fetch() {
        let cache = cache();
        cache.get("o1").await.unwrap();
        cache.invalidate("o1").await;
        cache.get("o1").await.unwrap();
        assert_eq!(cache.backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn get_with_deadline_returns_cached_value() {
        let cache = cache();
        let schema = cache
            .get_with_deadline("o1", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(schema.org_id, "o1");
    }

    #[tokio::test]
    async fn schema_helpers_filter_attributes() {
        let cache = cache();
        let schema = cache.get("o1").await.unwrap();
        assert_eq!(schema.pii_attributes().count(), 1);
        assert_eq!(schema.attributes_of_type("DEMOGRAPHIC").count(), 1);
        assert_eq!(schema.attributes_of_type("CONSENT").count(), 0);
    }

    #[tokio::test]
    async fn http_backend_parses_catalog_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orgs/o1/catalog/_search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "attributes": [
                    {"name": "email", "dataType": "STRING", "attributeType": "IDENTITY", "isRawPII": true},
                    {"name": "city", "dataType": "STRING", "attributeType": "LOCATION"}
                ],
                "count": 2
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(crate::config::ClientConfig {
            bearer_token: "t".to_owned(),
            ..Default::default()
        })
        .unwrap();
        let backend = HttpCatalogBackend::new(
            Arc::new(client),
            format!("{}/orgs/{{org_id}}/catalog/_search", server.uri()),
        );

        let schema = backend.fetch_schema("o1").await.unwrap();
        assert_eq!(schema.total_count, 2);
        assert_eq!(schema.attributes[0].name, "email");
        assert!(schema.attributes[0].is_raw_pii);
        assert!(!schema.attributes[1].is_raw_pii);
    }

    #[tokio::test]
    async fn http_backend_requires_org_id() {
        let client = ApiClient::new(crate::config::ClientConfig {
            bearer_token: "t".to_owned(),
            ..Default::default()
        })
        .unwrap();
        let backend = HttpCatalogBackend::new(Arc::new(client), "http://localhost/{org_id}");
        let err = backend.fetch_schema("").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)));
    }
}
