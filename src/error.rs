//! Error types

/// Errors from the resilient API client.
///
/// Transient upstream failures (timeouts, connection errors, 429/5xx) are
/// retried internally and only surface as `UpstreamUnavailable` once the
/// retry budget is exhausted. Client errors (4xx) are terminal and surface
/// immediately as `UpstreamRejected`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    /// Upstream kept failing transiently until the retry budget ran out.
    #[error("upstream unavailable after {attempts} attempts: {last_error}")]
    UpstreamUnavailable { attempts: u32, last_error: String },

    /// Upstream rejected the request with a terminal client error.
    #[error("upstream rejected request (status {status}): {body}")]
    UpstreamRejected { status: u16, body: String },

    /// The request was malformed before it ever reached the wire.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Upstream answered 2xx but the payload did not have the expected shape.
    #[error("failed to decode upstream response: {0}")]
    Decode(String),
}

/// Errors visible to callers of the cache manager.
///
/// Cache-tier-local faults (an unreachable L2, a corrupt entry) are absorbed
/// and logged, never surfaced here. Only origin failures, deadline
/// exhaustion, and a cancelled coalesced fetch reach the caller.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The origin loader failed; carries the client's error category.
    #[error(transparent)]
    Upstream(#[from] ApiError),

    /// The caller-supplied deadline elapsed while the fetch was in progress.
    #[error("fetch deadline exceeded")]
    Timeout,

    /// A coalesced in-flight fetch was cancelled before producing a result.
    #[error("coalesced fetch failed: {0}")]
    Coalesced(String),
}
