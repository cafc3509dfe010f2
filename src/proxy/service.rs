//! Main proxy service implementation
//!
//! `ProxyService` runs one inbound request through the pipeline:
//!
//! 1. Control calls (`/run...`) are answered directly and never proxied.
//! 2. The inbound body is buffered (bounded by `max_request_size`) and
//!    snapshotted together with the request headers.
//! 3. The request is forwarded to the URL computed by `UrlResolver`.
//! 4. On success the upstream status, headers and body are relayed to the
//!    client as they arrive, with `CapturingBody` keeping a copy of the body.
//!    Once the stream ends the exchange goes to the audit path.
//! 5. On a transport failure the exchange is logged with no response and the
//!    client gets the fixed 500.
//!
//! ```rust,ignore
//! use audit_proxy::proxy::{AuditConfig, AuditPath, ProxyConfig, ProxyService};
//!
//! let (audit, reporter) = AuditPath::new(sink, &AuditConfig::default());
//! tokio::spawn(reporter.run());
//!
//! let router = ProxyService::new(ProxyConfig::default(), audit)?.into_router();
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3001").await?;
//! axum::serve(listener, router).await?;
//! ```

use crate::domain::exchange::{CapturedRequest, CapturedRequestBody, HeaderSnapshot};
use crate::infrastructure::log_messages::request_processing as messages;
use crate::proxy::audit_path::AuditPath;
use crate::proxy::capture::{is_gzip_encoded, CapturingBody};
use crate::proxy::control;
use crate::proxy::error_response::proxy_failure_response;
use crate::proxy::headers::paths;
use crate::proxy::hot_path::HotPathForwarder;
use crate::proxy::logging_gate::LoggingGate;
use crate::proxy::middleware::request_id_of;
use crate::proxy::middleware_stack::ProxyMiddlewareStack;
use crate::proxy::sanitizer::sanitize_body;
use crate::proxy::types::*;
use crate::proxy::url_resolver::UrlResolver;
use axum::{
    body::Body,
    extract::{Request, State},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, warn};

/// Main proxy service combining the hot path and the audit path
#[derive(Debug)]
pub struct ProxyService {
    config: ProxyConfig,
    resolver: UrlResolver,
    forwarder: HotPathForwarder,
    audit: AuditPath,
}

impl ProxyService {
    pub fn new(config: ProxyConfig, audit: AuditPath) -> ProxyResult<Self> {
        let resolver = UrlResolver::new(config.target.clone(), config.api_prefix.clone());
        let forwarder = HotPathForwarder::new(&config)?;

        Ok(Self {
            config,
            resolver,
            forwarder,
            audit,
        })
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn gate(&self) -> &LoggingGate {
        self.audit.gate()
    }

    /// Create an Axum router for the proxy service with middleware
    pub fn into_router(self) -> Router {
        let router = Router::new()
            .route(paths::HEALTH, get(health_handler))
            .fallback(proxy_handler)
            .with_state(Arc::new(self));

        ProxyMiddlewareStack::new().apply_to_router(router)
    }

    /// Handle one inbound request end to end
    pub async fn handle(&self, request: Request) -> Response {
        if self.is_control_call(request.uri().path()) {
            let (parts, _body) = request.into_parts();
            return control::handle_control(
                &parts.headers,
                parts.uri.query(),
                self.config.control_token.as_ref(),
                self.audit.gate(),
            );
        }

        let request_id = request_id_of(&request);
        let (parts, body) = request.into_parts();

        let bytes = match self.read_body(body).await {
            Ok(bytes) => bytes,
            Err(rejection) => {
                warn!(
                    request_id = ?request_id,
                    method = %parts.method,
                    path = %parts.uri.path(),
                    error = %rejection,
                    "{}",
                    messages::REQUEST_REJECTED
                );
                return rejection.into_response();
            }
        };

        let captured = CapturedRequest::new(
            parts
                .uri
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or(paths::DEFAULT),
            parts.method.as_str(),
            HeaderSnapshot::from(&parts.headers),
            sanitize_body(CapturedRequestBody::parse(&bytes)),
        );

        let forwarded = match self.resolver.resolve_target_uri(&parts.uri) {
            Ok(target) => self.forwarder.forward(parts, bytes, target).await,
            Err(error) => Err(error),
        };

        match forwarded {
            Ok(response) => self.relay(captured, response),
            Err(error) => {
                error!(
                    request_id = ?request_id,
                    method = %captured.method,
                    url = %captured.url,
                    error = %error,
                    "{}",
                    messages::FORWARD_FAILED
                );
                self.audit.record_and_wait(captured.fail()).await;
                proxy_failure_response()
            }
        }
    }

    fn is_control_call(&self, path: &str) -> bool {
        path.starts_with(self.config.control_path.as_ref())
    }

    async fn read_body(&self, body: Body) -> ProxyResult<Bytes> {
        let max_size = self.config.max_request_size;

        match Limited::new(body, max_size.into_inner()).collect().await {
            Ok(collected) => Ok(collected.to_bytes()),
            Err(error) if error.is::<LengthLimitError>() => {
                Err(ProxyError::RequestTooLarge { max_size })
            }
            Err(error) => Err(ProxyError::RequestBody(error.to_string())),
        }
    }

    /// Stream the upstream response to the client, capturing a copy
    fn relay(&self, request: CapturedRequest, response: hyper::Response<Incoming>) -> Response {
        let (parts, body) = response.into_parts();

        let status = parts.status;
        let headers = HeaderSnapshot::from(&parts.headers);
        let gzip = is_gzip_encoded(&parts.headers);
        let audit = self.audit.clone();

        let body = CapturingBody::new(body, gzip, move |captured| {
            audit.record_captured(request, status, headers, captured);
        });

        Response::from_parts(parts, Body::new(body))
    }
}

/// Axum handler for proxying requests
async fn proxy_handler(State(proxy): State<Arc<ProxyService>>, request: Request) -> Response {
    proxy.handle(request).await
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    logging_active: bool,
}

/// Health check handler
async fn health_handler(State(proxy): State<Arc<ProxyService>>) -> impl IntoResponse {
    Json(HealthBody {
        status: "ok",
        logging_active: proxy.gate().is_active(),
    })
}
