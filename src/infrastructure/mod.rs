//! Infrastructure layer for the audit proxy
//!
//! This module contains the implementations for external concerns like
//! database access and the log sinks that persist captured exchanges.

pub mod database;
pub mod log_messages;
pub mod log_sink;

pub use database::*;
pub use log_sink::*;
