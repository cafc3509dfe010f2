//! Audit path: hands finished exchanges to the log sink off the hot path
//!
//! Admission (gate + content-type exclusion) is decided synchronously. The
//! record is then built and written on a spawned task that the request
//! handler never waits for, except on the proxy-failure path. Write errors
//! and panics inside the task are turned into `SinkFailure` reports on a
//! bounded channel drained by `DiagnosticsReporter`.

use crate::domain::exchange::{CapturedExchange, CapturedRequest, HeaderSnapshot, LogRecord};
use crate::domain::types::ExchangeId;
use crate::infrastructure::log_messages::audit as messages;
use crate::infrastructure::log_sink::LogSink;
use crate::proxy::capture::CapturedBody;
use crate::proxy::headers::content_types::{EXCLUDED_EXACT, EXCLUDED_PREFIX};
use crate::proxy::logging_gate::LoggingGate;
use futures_util::FutureExt;
use http::StatusCode;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Default capacity of the diagnostics channel
pub const DEFAULT_DIAGNOSTIC_CHANNEL_CAPACITY: usize = 1024;

/// Audit path configuration
#[derive(Clone, Debug)]
pub struct AuditConfig {
    /// Bounded capacity of the sink-failure channel
    pub diagnostic_channel_capacity: usize,
    /// Gate state at startup
    pub initially_active: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            diagnostic_channel_capacity: DEFAULT_DIAGNOSTIC_CHANNEL_CAPACITY,
            initially_active: true,
        }
    }
}

/// A write that did not make it to the sink
#[derive(Clone, Debug)]
pub struct SinkFailure {
    pub exchange_id: ExchangeId,
    pub url: String,
    pub sink: &'static str,
    pub error: String,
}

/// What happened to an exchange handed to the audit path
#[derive(Debug)]
pub enum RecordOutcome {
    /// A write task was spawned
    Scheduled(JoinHandle<()>),
    /// The gate was off when the exchange finished
    GateInactive,
    /// Request or response declared an excluded binary content type
    Excluded,
    /// Called outside a Tokio runtime
    NoRuntime,
}

impl RecordOutcome {
    pub fn is_scheduled(&self) -> bool {
        matches!(self, Self::Scheduled(_))
    }

    /// Wait for the spawned write, if any
    pub async fn settled(self) {
        if let Self::Scheduled(handle) = self {
            if let Err(join_error) = handle.await {
                error!(error = %join_error, "{}", messages::WRITE_PANICKED);
            }
        }
    }
}

/// Whether a declared content type keeps an exchange out of the log
///
/// Parameters are ignored: `image/*` and `application/octet-stream` are excluded.
pub fn is_excluded_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence.starts_with(EXCLUDED_PREFIX) || essence == EXCLUDED_EXACT
}

fn is_excluded(
    request_headers: &HeaderSnapshot,
    response_headers: Option<&HeaderSnapshot>,
) -> bool {
    std::iter::once(Some(request_headers))
        .chain(std::iter::once(response_headers))
        .flatten()
        .filter_map(HeaderSnapshot::content_type)
        .any(is_excluded_content_type)
}

/// Log sink adapter shared by every request
#[derive(Clone)]
pub struct AuditPath {
    sink: Arc<dyn LogSink>,
    gate: LoggingGate,
    diagnostics: mpsc::Sender<SinkFailure>,
}

impl AuditPath {
    /// Create the adapter and the reporter that drains its failure channel
    pub fn new(sink: Arc<dyn LogSink>, config: &AuditConfig) -> (Self, DiagnosticsReporter) {
        let (diagnostics, failures) = mpsc::channel(config.diagnostic_channel_capacity.max(1));
        let audit = Self {
            sink,
            gate: LoggingGate::new(config.initially_active),
            diagnostics,
        };
        (audit, DiagnosticsReporter { failures })
    }

    pub fn gate(&self) -> &LoggingGate {
        &self.gate
    }

    /// Fire-and-forget persistence of a finalized exchange
    pub fn record(&self, exchange: CapturedExchange) -> RecordOutcome {
        if let Err(outcome) = self.admit(&exchange.request.headers, exchange.response_headers()) {
            return outcome;
        }
        self.spawn_write(move || exchange)
    }

    /// Persist and wait for the write to settle
    pub async fn record_and_wait(&self, exchange: CapturedExchange) {
        self.record(exchange).settled().await;
    }

    /// Persist an exchange whose response body was captured from the stream
    ///
    /// Decoding and sanitizing the body happen on the write task.
    pub fn record_captured(
        &self,
        request: CapturedRequest,
        status: StatusCode,
        headers: HeaderSnapshot,
        body: CapturedBody,
    ) -> RecordOutcome {
        if let Err(outcome) = self.admit(&request.headers, Some(&headers)) {
            return outcome;
        }
        self.spawn_write(move || request.complete(status, headers, body.into_text()))
    }

    fn admit(
        &self,
        request_headers: &HeaderSnapshot,
        response_headers: Option<&HeaderSnapshot>,
    ) -> Result<(), RecordOutcome> {
        if !self.gate.is_active() {
            debug!("{}", messages::GATE_INACTIVE);
            return Err(RecordOutcome::GateInactive);
        }
        if is_excluded(request_headers, response_headers) {
            debug!("{}", messages::EXCLUDED_CONTENT_TYPE);
            return Err(RecordOutcome::Excluded);
        }
        Ok(())
    }

    fn spawn_write<F>(&self, build: F) -> RecordOutcome
    where
        F: FnOnce() -> CapturedExchange + Send + 'static,
    {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("{}", messages::NO_RUNTIME);
            return RecordOutcome::NoRuntime;
        };

        let sink = Arc::clone(&self.sink);
        let diagnostics = self.diagnostics.clone();

        RecordOutcome::Scheduled(runtime.spawn(async move {
            let record = LogRecord::from_exchange(build());
            let exchange_id = record.id;
            let url = record.url.clone();

            let error = match AssertUnwindSafe(sink.write(&record)).catch_unwind().await {
                Ok(Ok(())) => {
                    debug!(
                        exchange_id = %exchange_id,
                        sink = sink.name(),
                        "{}",
                        messages::RECORD_PERSISTED
                    );
                    return;
                }
                Ok(Err(sink_error)) => sink_error.to_string(),
                Err(_panic) => messages::WRITE_PANICKED.to_string(),
            };

            report(
                &diagnostics,
                SinkFailure {
                    exchange_id,
                    url,
                    sink: sink.name(),
                    error,
                },
            );
        }))
    }
}

impl std::fmt::Debug for AuditPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditPath")
            .field("sink", &self.sink.name())
            .field("gate", &self.gate)
            .finish()
    }
}

fn report(diagnostics: &mpsc::Sender<SinkFailure>, failure: SinkFailure) {
    if let Err(TrySendError::Full(failure) | TrySendError::Closed(failure)) =
        diagnostics.try_send(failure)
    {
        warn!(
            exchange_id = %failure.exchange_id,
            error = %failure.error,
            "{}",
            messages::DIAGNOSTICS_FULL
        );
    }
}

/// Consumer side of the sink-failure channel
#[derive(Debug)]
pub struct DiagnosticsReporter {
    failures: mpsc::Receiver<SinkFailure>,
}

impl DiagnosticsReporter {
    /// Next reported failure; `None` once every `AuditPath` clone is gone
    pub async fn recv(&mut self) -> Option<SinkFailure> {
        self.failures.recv().await
    }

    /// Log every failure until the channel closes
    pub async fn run(mut self) {
        info!("{}", messages::REPORTER_STARTED);
        while let Some(failure) = self.recv().await {
            error!(
                exchange_id = %failure.exchange_id,
                url = %failure.url,
                sink = failure.sink,
                error = %failure.error,
                "{}",
                messages::WRITE_FAILED
            );
        }
        info!("{}", messages::REPORTER_STOPPED);
    }
}
