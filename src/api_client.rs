//! Resilient upstream API client
//!
//! Authenticated JSON calls with per-attempt timeouts and retry of
//! transient failures (connect/timeout errors, HTTP 429 and 5xx) driven by
//! the [`BackoffPolicy`]. Terminal client errors (other 4xx) fail
//! immediately with zero retries. One tracing event is emitted per attempt.

use reqwest::Method;
use serde_json::Value;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::backoff::BackoffPolicy;
use crate::config::ClientConfig;
use crate::error::ApiError;

/// One upstream call with its retry/timeout parameters. Built per call,
/// discarded after completion; never persisted.
#[derive(Debug)]
pub struct RetryableRequest {
    method: Method,
    url: String,
    body: Option<Value>,
    timeout: Option<Duration>,
    max_attempts: Option<u32>,
    backoff_base: Option<Duration>,
}

impl RetryableRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            body: None,
            timeout: None,
            max_attempts: None,
            backoff_base: None,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Per-attempt timeout override.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = Some(base);
        self
    }
}

/// Raw successful response: payload plus status metadata.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

/// Why a single attempt failed; decides retry vs. terminal.
enum AttemptError {
    Transient(TransientFailure),
    Terminal { status: u16, body: String },
    Decode(String),
}

enum TransientFailure {
    Status(u16, String),
    Transport(String),
}

impl fmt::Display for TransientFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransientFailure::Status(status, body) => {
                write!(f, "upstream returned status {status}: {body}")
            }
            TransientFailure::Transport(msg) => write!(f, "transport error: {msg}"),
        }
    }
}

/// Shared, connection-pooled client. Holds no per-call mutable state, so
/// any number of calls may run concurrently on clones or references.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        if !config.no_auth && config.bearer_token.is_empty() {
            return Err(ApiError::InvalidRequest(
                "bearer token must be non-empty outside no-auth mode".to_owned(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ApiError::InvalidRequest(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    /// Performs the request, retrying transient failures per the backoff
    /// policy. Returns `UpstreamUnavailable` after exhaustion and
    /// `UpstreamRejected` immediately on a terminal 4xx.
    pub async fn execute(&self, request: RetryableRequest) -> Result<ApiResponse, ApiError> {
        if request.url.is_empty() {
            return Err(ApiError::InvalidRequest("target URL is required".to_owned()));
        }

        let backoff = BackoffPolicy::new(
            request.backoff_base.unwrap_or(self.config.backoff_base),
            self.config.backoff_cap,
            request.max_attempts.unwrap_or(self.config.max_attempts),
            self.config.jitter_fraction,
        );

        let mut attempt = 1u32;
        loop {
            let started = Instant::now();
            match self.attempt(&request).await {
                Ok(response) => {
                    debug!(
                        attempt,
                        latency_ms = started.elapsed().as_millis() as u64,
                        status = response.status,
                        "upstream request succeeded: {} {}",
                        request.method,
                        request.url
                    );
                    return Ok(response);
                }
                Err(AttemptError::Terminal { status, body }) => {
                    warn!(
                        attempt,
                        latency_ms = started.elapsed().as_millis() as u64,
                        status,
                        "upstream rejected request: {} {}",
                        request.method,
                        request.url
                    );
                    return Err(ApiError::UpstreamRejected { status, body });
                }
                Err(AttemptError::Decode(msg)) => {
                    warn!(
                        attempt,
                        latency_ms = started.elapsed().as_millis() as u64,
                        "undecodable upstream response: {} {} - {}",
                        request.method,
                        request.url,
                        msg
                    );
                    return Err(ApiError::Decode(msg));
                }
                Err(AttemptError::Transient(failure)) => {
                    warn!(
                        attempt,
                        latency_ms = started.elapsed().as_millis() as u64,
                        "transient upstream failure: {} {} - {}",
                        request.method,
                        request.url,
                        failure
                    );
                    if backoff.is_exhausted(attempt) {
                        return Err(ApiError::UpstreamUnavailable {
                            attempts: attempt,
                            last_error: failure.to_string(),
                        });
                    }
                    tokio::time::sleep(backoff.delay(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Convenience GET returning JSON.
    pub async fn get_json(&self, url: impl Into<String>) -> Result<ApiResponse, ApiError> {
        self.execute(RetryableRequest::new(Method::GET, url)).await
    }

    /// Convenience POST with a JSON body.
    pub async fn post_json(
        &self,
        url: impl Into<String>,
        body: Value,
    ) -> Result<ApiResponse, ApiError> {
        self.execute(RetryableRequest::new(Method::POST, url).with_body(body))
            .await
    }

    /// Lightweight reachability probe; a single attempt, no retries.
    pub async fn health_check(&self, url: &str) -> bool {
        let mut builder = self.http.get(url);
        if !self.config.no_auth {
            builder = builder.bearer_auth(&self.config.bearer_token);
        }
        match builder.send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!("health check failed for {}: {}", url, e);
                false
            }
        }
    }

    async fn attempt(&self, request: &RetryableRequest) -> Result<ApiResponse, AttemptError> {
        let mut builder = self.http.request(request.method.clone(), &request.url);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if !self.config.no_auth {
            builder = builder.bearer_auth(&self.config.bearer_token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AttemptError::Transient(TransientFailure::Transport(e.to_string())))?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::Transient(TransientFailure::Status(
                status.as_u16(),
                body,
            )));
        }
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::Terminal {
                status: status.as_u16(),
                body,
            });
        }

        // The upstream answered 2xx but with a body we cannot parse.
        // Retrying would replay the same malformed payload, so this is
        // terminal.
        let body: Value = response
            .json()
            .await
            .map_err(|e| AttemptError::Decode(e.to_string()))?;
        Ok(ApiResponse {
            status: status.as_u16(),
            body,
        })
    }
}
