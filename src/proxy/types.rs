//! Type definitions for the proxy module

use crate::domain::types::{ControlToken, PathPrefix, TargetUrl};
use crate::proxy::headers::paths;
use nutype::nutype;
#[allow(unused_imports)] // These are used by nutype derive macros
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

// ========== Size Types ==========

/// Maximum size for inbound request bodies in bytes
#[nutype(
    derive(Clone, Copy, Debug, Display, PartialEq, Eq, Deserialize, Serialize, TryFrom, AsRef),
    validate(predicate = |size: &usize| *size > 0),
)]
pub struct RequestSizeLimit(usize);

// ========== Identifiers ==========

/// Request ID for correlating access logs with captured exchanges
#[nutype(derive(
    Clone,
    Copy,
    Debug,
    Display,
    PartialEq,
    Eq,
    Deserialize,
    Serialize,
    From,
    AsRef
))]
pub struct RequestId(Uuid);

impl RequestId {
    /// Create a new RequestId with a v7 UUID
    pub fn generate() -> Self {
        Self::new(Uuid::now_v7())
    }

    /// Parse an id propagated in a header, if it is a UUID
    pub fn parse(value: &str) -> Option<Self> {
        Uuid::parse_str(value).ok().map(Self::new)
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::generate()
    }
}

// ========== Constants ==========

/// Default upstream used when nothing is configured
pub const DEFAULT_TARGET: &str = "http://127.0.0.1:8080";

/// Default request body limit (10MB)
pub const DEFAULT_MAX_REQUEST_SIZE: usize = 10 * 1024 * 1024;

/// Default upstream timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Fixed body of the response sent when forwarding fails
pub const PROXY_FAILURE_BODY: &str = "Error interno del proxy";

/// Proxy configuration
#[derive(Clone, Debug)]
pub struct ProxyConfig {
    /// Upstream base URL
    pub target: TargetUrl,
    /// Paths under this prefix are appended to the target
    pub api_prefix: PathPrefix,
    /// Paths under this prefix are handled by the control endpoint
    pub control_path: PathPrefix,
    /// Bearer secret for the control endpoint; `None` rejects every call
    pub control_token: Option<ControlToken>,
    /// Maximum inbound body size in bytes
    pub max_request_size: RequestSizeLimit,
    /// Upstream request timeout
    pub request_timeout: Duration,
    /// Rewrite `Host` to the upstream authority
    pub change_origin: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            target: TargetUrl::try_new(DEFAULT_TARGET).expect("default target is a valid URL"),
            api_prefix: PathPrefix::try_new(paths::API_PREFIX)
                .expect("API prefix constant should be a valid path"),
            control_path: PathPrefix::try_new(paths::CONTROL)
                .expect("control path constant should be a valid path"),
            control_token: None,
            max_request_size: RequestSizeLimit::try_new(DEFAULT_MAX_REQUEST_SIZE)
                .expect("10MB is valid"),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            change_origin: true,
        }
    }
}

/// Errors that can occur in the proxy
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Request too large (max: {max_size} bytes)")]
    RequestTooLarge { max_size: RequestSizeLimit },

    #[error("Failed to read request body: {0}")]
    RequestBody(String),

    #[error("Invalid target URL: {0}")]
    InvalidTargetUrl(String),

    #[error("Upstream request timed out after {0:?}")]
    UpstreamTimeout(Duration),

    #[error("Upstream connection error: {0}")]
    UpstreamConnection(String),

    #[error("TLS client setup failed: {0}")]
    TlsSetup(String),
}

/// Result type for proxy operations
pub type ProxyResult<T> = Result<T, ProxyError>;
