//! Mapping of inbound paths onto the upstream target

use crate::domain::types::{PathPrefix, TargetUrl};
use crate::proxy::headers::paths;
use crate::proxy::types::*;
use hyper::Uri;
use tracing::debug;

/// Computes the fully-qualified upstream URL for each inbound request
///
/// Paths under the API prefix are appended to the base target. Every other
/// path is sent to the base target unchanged, dropping the inbound path.
#[derive(Clone, Debug)]
pub struct UrlResolver {
    base: TargetUrl,
    api_prefix: PathPrefix,
}

impl UrlResolver {
    pub fn new(base: TargetUrl, api_prefix: PathPrefix) -> Self {
        Self { base, api_prefix }
    }

    /// Target URL for an inbound path (query string included, untouched)
    pub fn map_path(&self, path_and_query: &str) -> String {
        let target = map_target(self.base.as_ref(), self.api_prefix.as_ref(), path_and_query);
        debug!(inbound = path_and_query, target = %target, "Mapped inbound path");
        target
    }

    /// Resolve the URI for the outgoing request
    pub fn resolve_target_uri(&self, original_uri: &Uri) -> ProxyResult<Uri> {
        let path_and_query = original_uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or(paths::DEFAULT);

        let target = self.map_path(path_and_query);
        target
            .parse()
            .map_err(|_| ProxyError::InvalidTargetUrl(target))
    }
}

/// Pure form of the mapping rule
///
/// With `inbound` under `prefix`: one trailing slash is stripped from `base`,
/// `inbound` is normalized to exactly one leading slash, and the two are
/// concatenated. Otherwise `base` is returned as is.
pub fn map_target(base: &str, prefix: &str, inbound: &str) -> String {
    if !inbound.starts_with(prefix) {
        return base.to_string();
    }

    let base = base.strip_suffix('/').unwrap_or(base);
    let path = inbound.trim_start_matches('/');
    format!("{base}/{path}")
}
