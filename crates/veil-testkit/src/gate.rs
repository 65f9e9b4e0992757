//! Pause points for interleaving async operations in tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Notify, Semaphore};

/// Holds collaborator calls until the test releases them.
///
/// A collaborator calls [`Gate::pass`] at the start of each operation. While
/// the gate is armed that call parks until [`Gate::release`] is called, which
/// lets a test observe and act on the in-between state.
#[derive(Debug)]
pub struct Gate {
    armed: AtomicUsize,
    entered: Notify,
    released: Semaphore,
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

impl Gate {
    /// Open gate
    pub fn new() -> Self {
        Self {
            armed: AtomicUsize::new(0),
            entered: Notify::new(),
            released: Semaphore::new(0),
        }
    }

    /// Hold the next call that passes through
    pub fn hold_next(&self) {
        self.armed.fetch_add(1, Ordering::SeqCst);
    }

    /// Called by collaborators; parks while armed
    pub async fn pass(&self) {
        let held = self
            .armed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |armed| armed.checked_sub(1))
            .is_ok();
        if held {
            self.entered.notify_one();
            if let Ok(permit) = self.released.acquire().await {
                permit.forget();
            }
        }
    }

    /// Resolves once a held call has parked
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let one parked call continue
    pub fn release(&self) {
        self.released.add_permits(1);
    }
}
