//! Test utilities for proxy module testing
//!
//! In-memory and deliberately broken sinks, plus helpers to build a proxy
//! service wired to them.


#[cfg(test)]
mod tests {
    use super::test_helpers::*;
    use crate::domain::exchange::{CapturedRequest, CapturedRequestBody, HeaderSnapshot, LogRecord};
    use crate::infrastructure::log_sink::LogSink;
    use std::time::Duration;

    fn record() -> LogRecord {
        LogRecord::from_exchange(
            CapturedRequest::new("/", "GET", HeaderSnapshot::new(), CapturedRequestBody::default())
                .fail(),
        )
    }

    #[tokio::test]
    async fn test_memory_sink_counts_writes() {
        let sink = MemoryLogSink::new();
        sink.write(&record()).await.unwrap();
        sink.write(&record()).await.unwrap();

        assert_eq!(sink.write_calls(), 2);
        assert!(sink.wait_for_writes(2, Duration::from_millis(10)).await);
        assert!(!sink.wait_for_writes(3, Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_failing_sink_fails() {
        assert!(FailingLogSink.write(&record()).await.is_err());
    }
}
