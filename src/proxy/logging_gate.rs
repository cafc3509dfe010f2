//! Runtime switch deciding whether finished exchanges are persisted

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared on/off flag for exchange persistence
///
/// Cloning yields a handle to the same flag. Every exchange reads it once at
/// finalization, so a request racing a toggle sees one value or the other.
#[derive(Clone, Debug)]
pub struct LoggingGate {
    active: Arc<AtomicBool>,
}

impl LoggingGate {
    pub fn new(active: bool) -> Self {
        Self {
            active: Arc::new(AtomicBool::new(active)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }
}

impl Default for LoggingGate {
    fn default() -> Self {
        Self::new(true)
    }
}
