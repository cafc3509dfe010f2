//! End-to-end tests over real sockets
//!
//! client --> proxy (ephemeral port) --> upstream (axum or mockito)

use async_trait::async_trait;
use audit_proxy::config::Settings;
use audit_proxy::domain::{LogRecord, TargetUrl};
use audit_proxy::infrastructure::{LogSink, SinkError};
use audit_proxy::proxy::{AuditConfig, AuditPath, ProxyConfig, ProxyService};
use audit_proxy::Application;
use axum::body::Body;
use axum::routing::{get, post};
use axum::Router;
use bytes::Bytes;
use futures_util::stream;
use http::{Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

/// Sink collecting records in memory
#[derive(Default)]
struct CollectingSink {
    records: Mutex<Vec<LogRecord>>,
}

impl CollectingSink {
    fn records(&self) -> Vec<LogRecord> {
        self.records.lock().unwrap().clone()
    }

    async fn wait_for(&self, count: usize) -> Vec<LogRecord> {
        for _ in 0..100 {
            let records = self.records();
            if records.len() >= count {
                return records;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("expected {count} records, got {}", self.records().len());
    }
}

#[async_trait]
impl LogSink for CollectingSink {
    async fn write(&self, record: &LogRecord) -> Result<(), SinkError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "collecting"
    }
}

async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Upstream with a chunked streaming endpoint and an echo endpoint
async fn start_upstream() -> SocketAddr {
    let router = Router::new()
        .route(
            "/api/stream",
            get(|| async {
                let chunks = ["first,", "second,", "third"].map(|chunk| {
                    Ok::<_, std::convert::Infallible>(Bytes::from_static(chunk.as_bytes()))
                });
                Body::from_stream(stream::iter(chunks))
            }),
        )
        .route("/api/echo", post(|body: String| async move { body }));
    serve(router).await
}

async fn start_proxy(upstream: SocketAddr, sink: Arc<CollectingSink>) -> SocketAddr {
    let config = ProxyConfig {
        target: TargetUrl::try_new(format!("http://{upstream}")).unwrap(),
        ..ProxyConfig::default()
    };
    let (audit, reporter) = AuditPath::new(sink, &AuditConfig::default());
    tokio::spawn(reporter.run());
    serve(ProxyService::new(config, audit).unwrap().into_router()).await
}

async fn send(request: Request<Full<Bytes>>) -> (StatusCode, http::HeaderMap, Bytes) {
    let client = Client::builder(TokioExecutor::new()).build_http();
    let response = client.request(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, body)
}

#[tokio::test]
async fn test_streamed_response_is_relayed_and_logged_whole() {
    let upstream = start_upstream().await;
    let sink = Arc::new(CollectingSink::default());
    let proxy = start_proxy(upstream, sink.clone()).await;

    let (status, headers, body) = send(
        Request::get(format!("http://{proxy}/api/stream"))
            .body(Full::default())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(headers.contains_key("x-request-id"));
    assert_eq!(&body[..], b"first,second,third");

    let records = sink.wait_for(1).await;
    assert_eq!(records[0].url, "/api/stream");
    assert_eq!(records[0].method, "GET");
    assert_eq!(records[0].response_body.as_deref(), Some("first,second,third"));
}

#[tokio::test]
async fn test_posted_body_reaches_upstream_unchanged() {
    let upstream = start_upstream().await;
    let sink = Arc::new(CollectingSink::default());
    let proxy = start_proxy(upstream, sink.clone()).await;

    let payload = "name=gear\u{0001}&qty=3";
    let (status, _headers, body) = send(
        Request::post(format!("http://{proxy}/api/echo?trace=1"))
            .header("content-type", "text/plain")
            .body(Full::new(Bytes::from(payload)))
            .unwrap(),
    )
    .await;

    // Sanitizing applies to the logged copy only
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], payload.as_bytes());

    let records = sink.wait_for(1).await;
    assert_eq!(records[0].url, "/api/echo?trace=1");
    assert_eq!(
        serde_json::to_value(&records[0].request_body).unwrap(),
        serde_json::json!("name=gear&qty=3")
    );
}

#[tokio::test]
async fn test_application_serves_with_tracing_sink() {
    let mut upstream = mockito::Server::new_async().await;
    let mock = upstream
        .mock("GET", "/api/status")
        .with_body("up")
        .create_async()
        .await;

    let vars = [
        ("AUDIT_PROXY__APPLICATION__HOST", "127.0.0.1".to_string()),
        ("PORT", "0".to_string()),
        ("TARGET", upstream.url()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    let app = Application::build(Settings::from_env(vars).unwrap())
        .await
        .unwrap();
    let proxy = app.local_addr().unwrap();

    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(app.run_until(async {
        let _ = stopped.await;
    }));

    let (status, _headers, body) = send(
        Request::get(format!("http://{proxy}/api/status"))
            .body(Full::default())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"up");
    mock.assert_async().await;

    stop.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server should stop")
        .unwrap()
        .unwrap();
}
