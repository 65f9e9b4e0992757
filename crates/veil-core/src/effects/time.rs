//! Wall-clock time effect.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock time source used for authorization validity windows.
#[async_trait]
pub trait TimeEffects: Send + Sync {
    /// Current Unix timestamp in seconds.
    async fn current_timestamp(&self) -> u64;
}

#[async_trait]
impl<T: TimeEffects + ?Sized> TimeEffects for Arc<T> {
    async fn current_timestamp(&self) -> u64 {
        (**self).current_timestamp().await
    }
}

/// System clock handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock handler
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TimeEffects for SystemClock {
    async fn current_timestamp(&self) -> u64 {
        // Clocks set before the epoch read as 0
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}
