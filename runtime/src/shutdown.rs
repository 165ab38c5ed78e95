//! Cooperative cancellation for coordinated shutdown.
//!
//! One [`Shutdown`] per service process. Tasks hold listeners; triggering the
//! shutdown (manually or from a signal) wakes every listener, after which the
//! composition root stops transports, consumers, producer and stores in
//! order, bounded by the graceful timeout.

use std::time::Duration;
use tokio::sync::watch;

/// Default grace period for shutdown sequencing.
pub const DEFAULT_GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

/// Root cancellation handle for a service process.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    /// Create an untriggered shutdown handle.
    #[must_use]
    pub fn new() -> Self {
        Self { tx: watch::channel(false).0 }
    }

    /// A listener that resolves once shutdown is triggered.
    #[must_use]
    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener { rx: self.tx.subscribe() }
    }

    /// Trigger shutdown. Idempotent.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    /// Whether shutdown has been triggered.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Trigger on SIGINT (and SIGTERM on unix).
    ///
    /// Spawns a task; returns immediately.
    pub fn trigger_on_signal(&self) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            tracing::info!("shutdown signal received");
            let _ = tx.send(true);
        });
    }
}

/// A clonable wait handle on the root shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl ShutdownListener {
    /// Resolve once shutdown is triggered. Returns immediately if it already
    /// was.
    pub async fn wait(&mut self) {
        if *self.rx.borrow() {
            return;
        }
        // The sender outlives listeners in normal operation; a dropped
        // sender also means the process is going down.
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }

    /// Whether shutdown has been triggered.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
