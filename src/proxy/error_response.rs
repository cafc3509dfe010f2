//! Client-visible bodies produced by the proxy itself
//!
//! Upstream responses are relayed verbatim. Only the control endpoint and the
//! proxy's own failures produce bodies, and they are shaped here.

use crate::proxy::headers::content_types::TEXT_PLAIN;
use crate::proxy::headers::CONTENT_TYPE;
use crate::proxy::types::{ProxyError, PROXY_FAILURE_BODY};
use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// `{"error": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }

    pub fn into_response_with_status(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

/// `{"message": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBody {
    pub message: String,
}

impl MessageBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl IntoResponse for MessageBody {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Fixed 500 sent when forwarding fails
pub fn proxy_failure_response() -> Response {
    let mut response = (StatusCode::INTERNAL_SERVER_ERROR, PROXY_FAILURE_BODY).into_response();
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
    response
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        match self {
            ProxyError::RequestTooLarge { .. } => ErrorBody::new(self.to_string())
                .into_response_with_status(StatusCode::PAYLOAD_TOO_LARGE),
            ProxyError::RequestBody(_) => {
                ErrorBody::new(self.to_string()).into_response_with_status(StatusCode::BAD_REQUEST)
            }
            ProxyError::InvalidTargetUrl(_)
            | ProxyError::UpstreamTimeout(_)
            | ProxyError::UpstreamConnection(_)
            | ProxyError::TlsSetup(_) => proxy_failure_response(),
        }
    }
}
