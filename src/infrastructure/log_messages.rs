//! Log message constants for the audit proxy
//!
//! This module centralizes the log messages used throughout the proxy so that
//! wording stays consistent between components.

/// Application startup and lifecycle messages
pub mod application {
    pub const STARTING: &str = "Starting audit proxy";
    pub const LISTENING: &str = "Proxy listening";
    pub const SHUTDOWN_SIGNAL: &str = "Shutdown signal received, draining connections";
    pub const STOPPED: &str = "Audit proxy stopped";
    pub const NO_DATABASE: &str =
        "No storage connection string configured, exchanges go to the tracing sink";
    pub const NO_CONTROL_TOKEN: &str =
        "No control token configured, the control endpoint rejects every call";
}

/// Database-related log messages
pub mod database {
    pub const HEALTH_CHECK_FAILED: &str = "Database health check failed";
    pub const CONNECTION_ESTABLISHED: &str = "Database connection established";
    pub const MIGRATION_STARTED: &str = "Running database migrations";
    pub const MIGRATION_COMPLETED: &str = "Database migrations completed successfully";
}

/// Sink messages
pub mod sink {
    pub const RECORD_EMITTED: &str = "Captured exchange";
}

/// Audit path messages
pub mod audit {
    pub const REPORTER_STARTED: &str = "Sink diagnostics reporter started";
    pub const REPORTER_STOPPED: &str = "Sink diagnostics reporter stopped";
    pub const RECORD_PERSISTED: &str = "Exchange persisted";
    pub const WRITE_FAILED: &str = "Failed to persist exchange";
    pub const WRITE_PANICKED: &str = "Sink write task panicked";
    pub const DIAGNOSTICS_FULL: &str = "Sink diagnostics channel full, dropping failure report";
    pub const EXCLUDED_CONTENT_TYPE: &str = "Binary content type, exchange not logged";
    pub const GATE_INACTIVE: &str = "Logging gate inactive, exchange not logged";
    pub const NO_RUNTIME: &str = "No async runtime available, exchange not logged";
}

/// Request/response processing messages
pub mod request_processing {
    pub const FORWARDING: &str = "Forwarding request upstream";
    pub const FORWARD_FAILED: &str = "Proxy error while forwarding request";
    pub const CAPTURE_DECODE_FAILED: &str = "Failed to decompress captured response body";
    pub const CAPTURE_INCOMPLETE: &str = "Response stream ended early, logging partial body";
    pub const REQUEST_REJECTED: &str = "Inbound request rejected before forwarding";
}

/// Control endpoint messages
pub mod control {
    pub const UNAUTHORIZED: &str = "Unauthorized control endpoint call";
    pub const GATE_CHANGED: &str = "Logging gate updated";
}
