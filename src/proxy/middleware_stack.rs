//! Middleware stack builder for clean composition
//!
//! Composes the Tower layers wrapped around the proxy router so the ordering
//! lives in one place.

use crate::proxy::middleware::*;
use axum::{body::Body, middleware::from_fn, Router};
use tower_http::trace::TraceLayer;
use tracing::Span;

/// Builder for composing the proxy middleware stack
#[derive(Clone, Copy, Debug, Default)]
pub struct ProxyMiddlewareStack;

impl ProxyMiddlewareStack {
    pub fn new() -> Self {
        Self
    }

    /// Apply the complete middleware stack to a router
    ///
    /// The middleware are applied in the following order (outer to inner):
    /// 1. Request ID generation/propagation
    /// 2. HTTP trace span carrying the request ID
    /// 3. Access logging
    pub fn apply_to_router<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router
            .layer(from_fn(logging_middleware))
            .layer(TraceLayer::new_for_http().make_span_with(request_span))
            .layer(from_fn(request_id_middleware))
    }
}

fn request_span(request: &http::Request<Body>) -> Span {
    let request_id = request_id_of(request)
        .map(|id| id.to_string())
        .unwrap_or_default();

    tracing::info_span!(
        "http_request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::headers::X_REQUEST_ID;
    use axum::{http::StatusCode, response::IntoResponse};
    use tower::ServiceExt;

    async fn handler() -> impl IntoResponse {
        StatusCode::OK
    }

    fn request() -> http::Request<Body> {
        http::Request::builder()
            .uri("/test")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_middleware_stack_sets_request_id() {
        let router = Router::new().route("/test", axum::routing::get(handler));
        let app = ProxyMiddlewareStack::new().apply_to_router(router);

        let response = app.oneshot(request()).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(X_REQUEST_ID));
    }
}
