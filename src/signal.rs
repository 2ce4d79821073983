//! Wake-up signal for the queue drainer.

use std::sync::Arc;
use tokio::sync::Notify;

/// Signals that capacity may have freed up.
///
/// Raised after a stream stops, a slot is released or an agent's capacity
/// grows. Multiple raises before the drainer wakes coalesce into one.
#[derive(Debug, Clone, Default)]
pub struct DrainSignal {
    notify: Arc<Notify>,
}

impl DrainSignal {
    /// Creates a new signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wakes the drainer, or primes the next wait if it is busy.
    pub fn raise(&self) {
        self.notify.notify_one();
    }

    /// Waits for the next raise.
    pub async fn raised(&self) {
        self.notify.notified().await;
    }
}
