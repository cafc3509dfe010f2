//! Middleware implementations for the proxy service

use crate::proxy::headers::X_REQUEST_ID;
use crate::proxy::types::RequestId;
use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use std::time::Instant;
use tracing::info;

/// Request ID carried by a request, if the request ID middleware ran
pub fn request_id_of<B>(request: &http::Request<B>) -> Option<RequestId> {
    request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|h| h.to_str().ok())
        .and_then(RequestId::parse)
}

/// Request ID middleware - ensures every request has a unique ID for tracing
///
/// A valid UUID supplied by the client is kept, anything else is replaced.
/// The ID is forwarded upstream and echoed on the response unless the
/// response already carries one, so an upstream's own ID is relayed as is.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request_id_of(&request).unwrap_or_else(RequestId::generate);

    // A UUID's string form is always a valid header value
    let header_value = HeaderValue::from_str(&request_id.to_string()).ok();

    if let Some(value) = header_value.clone() {
        request.headers_mut().insert(X_REQUEST_ID, value);
    }

    let mut response = next.run(request).await;

    if let Some(value) = header_value {
        response.headers_mut().entry(X_REQUEST_ID).or_insert(value);
    }

    response
}

/// Logging middleware - logs request/response details with timing
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request_id_of(&request)
        .map(|id| id.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    info!(
        request_id = request_id,
        method = %method,
        path = %uri.path(),
        "Incoming request"
    );

    let response = next.run(request).await;
    let duration = start.elapsed();

    info!(
        request_id = request_id,
        method = %method,
        path = %uri.path(),
        status = response.status().as_u16(),
        duration_ms = duration.as_millis(),
        "Request completed"
    );

    response
}
