//! In-flight tracking for graceful consumer shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Tracks in-flight handler invocations so graceful stop can drain them.
#[derive(Debug, Default)]
pub struct InflightTracker {
    count: AtomicUsize,
    draining: AtomicBool,
    drained: Notify,
}

impl InflightTracker {
    /// Create a tracker with nothing in flight.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record one message entering processing.
    pub fn enter(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    /// Record one message leaving processing (success or terminal failure).
    pub fn exit(&self) {
        let previous = self.count.fetch_sub(1, Ordering::SeqCst);
        if previous == 1 && self.draining.load(Ordering::SeqCst) {
            self.drained.notify_waiters();
        }
    }

    /// Number of handlers currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Wait until everything in flight has finished, up to `deadline`.
    ///
    /// Returns `true` when the tracker drained in time.
    pub async fn drain(&self, deadline: Duration) -> bool {
        self.draining.store(true, Ordering::SeqCst);
        let end = Instant::now() + deadline;
        while self.in_flight() > 0 {
            let remaining = end.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            // Re-check periodically: a notify can race with the final exit.
            let _ = tokio::time::timeout(
                remaining.min(Duration::from_millis(100)),
                self.drained.notified(),
            )
            .await;
        }
        true
    }
}
