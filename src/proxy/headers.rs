//! HTTP header constants and well-known paths for the proxy service
//!
//! This module centralizes header names, paths and content types used
//! throughout the proxy so that they stay consistent.

use ::http::header;

/// Header name for request ID used for tracing and correlation
pub const X_REQUEST_ID: &str = "x-request-id";

/// Authorization header prefix for bearer tokens
pub const BEARER_PREFIX: &str = "Bearer ";

/// Content encoding whose captured copy is decompressed before logging
pub const GZIP_ENCODING: &str = "gzip";

/// Standard header re-exports for convenience
pub use header::{AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE, HOST};

/// Well-known paths
pub mod paths {
    /// Default path when none is specified
    pub const DEFAULT: &str = "/";

    /// Prefix whose requests are appended to the upstream base URL
    pub const API_PREFIX: &str = "/api/";

    /// Control endpoint toggling the logging gate
    pub const CONTROL: &str = "/run";

    /// Health check endpoint path, under a prefix upstreams are unlikely to use
    pub const HEALTH: &str = "/_proxy/health";
}

/// Query parameters understood by the control endpoint
pub mod control_params {
    pub const ACTIVE: &str = "active";
    pub const ACTIVATE: &str = "t";
    pub const DEACTIVATE: &str = "f";
}

/// Content types used by the proxy
pub mod content_types {
    pub const TEXT_PLAIN: &str = "text/plain";

    /// Any media type with this prefix is never logged
    pub const EXCLUDED_PREFIX: &str = "image/";

    /// Media type that is never logged
    pub const EXCLUDED_EXACT: &str = "application/octet-stream";
}
