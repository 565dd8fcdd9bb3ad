//! Cooperative cancellation for a single engine session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared kill flag, set by an external canceller and polled by the bridge.
///
/// Clones share the same flag. There is no way to clear it: once a session is
/// killed it stays killed.
#[derive(Debug, Clone, Default)]
pub struct KillFlag {
    killed: Arc<AtomicBool>,
}

impl KillFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kill(&self) {
        self.killed.store(true, Ordering::Relaxed);
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::Relaxed)
    }
}
