//! Domain types for the audit proxy
//!
//! These types describe what an exchange is and how it is recorded,
//! independent of the HTTP plumbing that produces them.

pub mod exchange;
pub mod types;

pub use exchange::*;
pub use types::*;
