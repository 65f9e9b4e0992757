//! Controllable wall clock.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use veil_core::effects::TimeEffects;

/// Clock that only moves when the test moves it.
#[derive(Debug, Clone)]
pub struct ControllableClock {
    now: Arc<AtomicU64>,
}

impl ControllableClock {
    /// Clock starting at `timestamp` (Unix seconds)
    pub fn new(timestamp: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(timestamp)),
        }
    }

    /// Advance by `seconds`
    pub fn advance(&self, seconds: u64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }

    /// Jump to an absolute timestamp
    pub fn set(&self, timestamp: u64) {
        self.now.store(timestamp, Ordering::SeqCst);
    }

    /// Current reading
    pub fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TimeEffects for ControllableClock {
    async fn current_timestamp(&self) -> u64 {
        self.now()
    }
}
