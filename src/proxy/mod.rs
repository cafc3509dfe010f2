//! Proxy module: transparent forwarding with audit capture
//!
//! This module implements the dual-path architecture:
//! - Hot path: the request is forwarded and the upstream response is
//!   streamed back to the client untouched
//! - Audit path: the captured exchange is handed to the log sink on a
//!   separate task so that persistence never delays or breaks the client

pub mod audit_path;
pub mod capture;
pub mod control;
pub mod error_response;
pub mod headers;
pub mod hot_path;
pub mod logging_gate;
pub mod middleware;
pub mod middleware_stack;
pub mod sanitizer;
pub mod service;
pub mod test_utils;
pub mod types;
pub mod url_resolver;


pub use audit_path::{AuditConfig, AuditPath, DiagnosticsReporter, SinkFailure};
pub use logging_gate::LoggingGate;
pub use middleware_stack::ProxyMiddlewareStack;
pub use sanitizer::{sanitize, sanitize_body, sanitize_json};
pub use service::ProxyService;
pub use types::{ProxyConfig, ProxyError, ProxyResult};
