//! Durable destinations for captured exchanges

use crate::domain::exchange::LogRecord;
use crate::infrastructure::log_messages::sink as messages;
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use thiserror::Error;
use tracing::info;

/// Errors raised while writing a record
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Append-only destination for log records
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Persist one record
    async fn write(&self, record: &LogRecord) -> Result<(), SinkError>;

    /// Short name used in diagnostics
    fn name(&self) -> &'static str;
}

const INSERT_LOG: &str = r#"
    INSERT INTO logs (
        id, url, method, request_status, request_header, request_body,
        response_status, response_header, response_body, created_at
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
"#;

/// Writes one row per exchange into the `logs` table
#[derive(Clone, Debug)]
pub struct PostgresLogSink {
    pool: PgPool,
}

impl PostgresLogSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LogSink for PostgresLogSink {
    async fn write(&self, record: &LogRecord) -> Result<(), SinkError> {
        sqlx::query(INSERT_LOG)
            .bind(record.id.into_uuid())
            .bind(&record.url)
            .bind(&record.method)
            .bind(record.request_status)
            .bind(Json(&record.request_header))
            .bind(Json(&record.request_body))
            .bind(record.response_status)
            .bind(Json(&record.response_header))
            .bind(record.response_body.as_deref())
            .bind(record.created_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

/// Emits records as structured log lines when no database is configured
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogSink;

#[async_trait]
impl LogSink for TracingLogSink {
    async fn write(&self, record: &LogRecord) -> Result<(), SinkError> {
        let serialized = serde_json::to_string(record)?;
        info!(exchange_id = %record.id, record = %serialized, "{}", messages::RECORD_EMITTED);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "tracing"
    }
}
