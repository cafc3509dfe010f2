//! Captured exchanges and the record shape they are persisted as
//!
//! A `CapturedRequest` is assembled while the inbound body is received. It is
//! turned into a `CapturedExchange` exactly once, either when the response
//! stream finishes or when forwarding fails, and then into a `LogRecord` for
//! the sink. Nothing here is shared between requests.

use crate::domain::types::ExchangeId;
use chrono::{DateTime, Utc};
use http::{header, HeaderMap, StatusCode};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// Ordered snapshot of HTTP headers, one entry per distinct name
///
/// Names keep the order in which they first appeared. A name with a single
/// value serializes as a JSON string, a repeated name as an array.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderSnapshot(Vec<(String, Vec<String>)>);

impl HeaderSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_header_map(headers: &HeaderMap) -> Self {
        let entries = headers
            .keys()
            .map(|name| {
                let values = headers
                    .get_all(name)
                    .iter()
                    .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
                    .collect();
                (name.as_str().to_string(), values)
            })
            .collect();
        Self(entries)
    }

    /// First value for `name`, compared case-insensitively
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .and_then(|(_, values)| values.first())
            .map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get(header::CONTENT_TYPE.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn entries(&self) -> &[(String, Vec<String>)] {
        &self.0
    }
}

impl From<&HeaderMap> for HeaderSnapshot {
    fn from(headers: &HeaderMap) -> Self {
        Self::from_header_map(headers)
    }
}

impl Serialize for HeaderSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, values) in &self.0 {
            match values.as_slice() {
                [single] => map.serialize_entry(name, single)?,
                many => map.serialize_entry(name, many)?,
            }
        }
        map.end()
    }
}

/// Inbound request body as it will be logged
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CapturedRequestBody {
    /// The body parsed as JSON
    Json(serde_json::Value),
    /// Anything else, decoded lossily as UTF-8
    Text(String),
}

impl CapturedRequestBody {
    /// Parse opportunistically; malformed JSON falls back to raw text
    pub fn parse(bytes: &[u8]) -> Self {
        match serde_json::from_slice::<serde_json::Value>(bytes) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Text(String::from_utf8_lossy(bytes).into_owned()),
        }
    }
}

impl Default for CapturedRequestBody {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

/// Request half of an exchange, owned by the handler until finalization
#[derive(Clone, Debug, PartialEq)]
pub struct CapturedRequest {
    pub url: String,
    pub method: String,
    pub headers: HeaderSnapshot,
    pub body: CapturedRequestBody,
}

impl CapturedRequest {
    pub fn new(
        url: impl Into<String>,
        method: impl Into<String>,
        headers: HeaderSnapshot,
        body: CapturedRequestBody,
    ) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            headers,
            body,
        }
    }

    /// Finalize after the upstream response has been streamed to the client
    pub fn complete(
        self,
        status: StatusCode,
        headers: HeaderSnapshot,
        body: String,
    ) -> CapturedExchange {
        CapturedExchange {
            request: self,
            outcome: ExchangeOutcome::Completed {
                status,
                headers,
                body,
            },
        }
    }

    /// Finalize after forwarding failed before any response was produced
    pub fn fail(self) -> CapturedExchange {
        CapturedExchange {
            request: self,
            outcome: ExchangeOutcome::Failed,
        }
    }
}

/// How an exchange ended
#[derive(Clone, Debug, PartialEq)]
pub enum ExchangeOutcome {
    Completed {
        status: StatusCode,
        headers: HeaderSnapshot,
        body: String,
    },
    Failed,
}

/// One finished request/response cycle
#[derive(Clone, Debug, PartialEq)]
pub struct CapturedExchange {
    pub request: CapturedRequest,
    pub outcome: ExchangeOutcome,
}

impl CapturedExchange {
    pub fn response_status(&self) -> Option<StatusCode> {
        match &self.outcome {
            ExchangeOutcome::Completed { status, .. } => Some(*status),
            ExchangeOutcome::Failed => None,
        }
    }

    /// Status code the client actually received
    pub fn delivered_status(&self) -> StatusCode {
        self.response_status()
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn response_headers(&self) -> Option<&HeaderSnapshot> {
        match &self.outcome {
            ExchangeOutcome::Completed { headers, .. } => Some(headers),
            ExchangeOutcome::Failed => None,
        }
    }

    pub fn response_body(&self) -> Option<&str> {
        match &self.outcome {
            ExchangeOutcome::Completed { body, .. } => Some(body),
            ExchangeOutcome::Failed => None,
        }
    }
}

/// Row written to the sink, one per exchange
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LogRecord {
    pub id: ExchangeId,
    pub url: String,
    pub method: String,
    pub request_status: Option<i32>,
    pub request_header: HeaderSnapshot,
    pub request_body: CapturedRequestBody,
    pub response_status: Option<i32>,
    pub response_header: HeaderSnapshot,
    pub response_body: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LogRecord {
    /// Build the record with a freshly generated id
    pub fn from_exchange(exchange: CapturedExchange) -> Self {
        let request_status = Some(i32::from(exchange.delivered_status().as_u16()));
        let CapturedExchange { request, outcome } = exchange;

        let (response_status, response_header, response_body) = match outcome {
            ExchangeOutcome::Completed {
                status,
                headers,
                body,
            } => (Some(i32::from(status.as_u16())), headers, Some(body)),
            ExchangeOutcome::Failed => (None, HeaderSnapshot::new(), None),
        };

        Self {
            id: ExchangeId::generate(),
            url: request.url,
            method: request.method,
            request_status,
            request_header: request.headers,
            request_body: request.body,
            response_status,
            response_header,
            response_body,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use serde_json::json;

    fn sample_request() -> CapturedRequest {
        CapturedRequest::new(
            "/api/widgets?page=2",
            "POST",
            HeaderSnapshot::new(),
            CapturedRequestBody::parse(br#"{"name":"gear"}"#),
        )
    }

    #[test]
    fn test_request_body_parses_json() {
        let body = CapturedRequestBody::parse(br#"{"a":[1,2]}"#);
        assert_eq!(body, CapturedRequestBody::Json(json!({"a": [1, 2]})));
    }

    #[test]
    fn test_request_body_falls_back_to_text() {
        let body = CapturedRequestBody::parse(b"name=gear&qty=3");
        assert_eq!(body, CapturedRequestBody::Text("name=gear&qty=3".into()));

        let truncated = CapturedRequestBody::parse(br#"{"name":"#);
        assert_eq!(truncated, CapturedRequestBody::Text(r#"{"name":"#.into()));
    }

    #[test]
    fn test_empty_request_body_is_empty_text() {
        assert_eq!(
            CapturedRequestBody::parse(b""),
            CapturedRequestBody::Text(String::new())
        );
    }

    #[test]
    fn test_header_snapshot_preserves_order_and_multi_values() {
        let mut headers = HeaderMap::new();
        headers.insert("x-first", HeaderValue::from_static("1"));
        headers.append("set-cookie", HeaderValue::from_static("a=1"));
        headers.append("set-cookie", HeaderValue::from_static("b=2"));
        headers.insert("content-type", HeaderValue::from_static("text/plain"));

        let snapshot = HeaderSnapshot::from_header_map(&headers);
        let names: Vec<_> = snapshot.entries().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["x-first", "set-cookie", "content-type"]);
        assert_eq!(snapshot.content_type(), Some("text/plain"));
        assert_eq!(snapshot.get("Content-Type"), Some("text/plain"));

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(
            value,
            json!({
                "x-first": "1",
                "set-cookie": ["a=1", "b=2"],
                "content-type": "text/plain"
            })
        );
    }

    #[test]
    fn test_completed_exchange_record() {
        let exchange = sample_request().complete(
            StatusCode::CREATED,
            HeaderSnapshot::new(),
            "{\"id\":7}".into(),
        );
        let record = LogRecord::from_exchange(exchange);

        assert_eq!(record.url, "/api/widgets?page=2");
        assert_eq!(record.method, "POST");
        assert_eq!(record.request_status, Some(201));
        assert_eq!(record.response_status, Some(201));
        assert_eq!(record.response_body.as_deref(), Some("{\"id\":7}"));
        assert_eq!(record.request_body, CapturedRequestBody::Json(json!({"name": "gear"})));
    }

    #[test]
    fn test_failed_exchange_record_has_null_response() {
        let record = LogRecord::from_exchange(sample_request().fail());

        assert_eq!(record.request_status, Some(500));
        assert_eq!(record.response_status, None);
        assert_eq!(record.response_body, None);
        assert!(record.response_header.is_empty());

        let value = serde_json::to_value(&record).unwrap();
        assert!(value["response_status"].is_null());
        assert!(value["response_body"].is_null());
    }
}
