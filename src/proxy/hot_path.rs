//! Hot path: forwards one buffered request upstream and returns the
//! streaming response head
//!
//! The client speaks plain HTTP/1.1 or TLS depending on the target scheme.

use crate::infrastructure::log_messages::request_processing as messages;
use crate::proxy::headers::HOST;
use crate::proxy::types::*;
use bytes::Bytes;
use http::request::Parts;
use http::Version;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, Uri};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use tracing::debug;

/// Upstream client shared by every request
#[derive(Clone, Debug)]
pub struct HotPathForwarder {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    request_timeout: Duration,
    change_origin: bool,
}

impl HotPathForwarder {
    /// Build the upstream client
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::TlsSetup` if the TLS client configuration cannot
    /// be assembled.
    pub fn new(config: &ProxyConfig) -> ProxyResult<Self> {
        // The TLS layer hands https URIs to the inner connector
        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false);

        let connector = HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())
            .map_err(|e| ProxyError::TlsSetup(e.to_string()))?
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let client = Client::builder(TokioExecutor::new())
            .http1_title_case_headers(true)
            .http1_preserve_header_case(true)
            .build(connector);

        Ok(Self {
            client,
            request_timeout: config.request_timeout,
            change_origin: config.change_origin,
        })
    }

    /// Send the request to `target`
    ///
    /// Any failure before the response head arrives (refused connection,
    /// reset, timeout) is returned as an error rather than a response.
    pub async fn forward(
        &self,
        mut parts: Parts,
        body: Bytes,
        target: Uri,
    ) -> ProxyResult<Response<Incoming>> {
        debug!(target = %target, method = %parts.method, "{}", messages::FORWARDING);

        parts.uri = target;
        parts.version = Version::HTTP_11;
        if self.change_origin {
            // The client derives Host from the target URI when none is set
            parts.headers.remove(HOST);
        }

        let outgoing = Request::from_parts(parts, Full::new(body));

        tokio::time::timeout(self.request_timeout, self.client.request(outgoing))
            .await
            .map_err(|_| ProxyError::UpstreamTimeout(self.request_timeout))?
            .map_err(|e| ProxyError::UpstreamConnection(e.to_string()))
    }
}
