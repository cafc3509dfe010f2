//! Audit Proxy - a transparent HTTP proxy that records every exchange
//!
//! Requests are forwarded to a single upstream and the responses streamed
//! back untouched, while a sanitized copy of each request/response pair is
//! persisted off the request path.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod proxy;

pub use application::Application;
pub use error::{Error, Result};
