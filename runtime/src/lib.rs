//! # Rocketry Runtime
//!
//! Service lifecycle for the Rocketry fabric: startup with backoff,
//! dependency health aggregation, cooperative shutdown and metrics.
//!
//! A service composes itself in a fixed order: config → tracing → metrics →
//! external connections (each through [`connect::connect_with_backoff`]) →
//! stores → business services → transports. Shutdown runs the same order in
//! reverse under the graceful timeout. Readiness means every registered
//! dependency check passes.
//!
//! # Example
//!
//! ```no_run
//! use rocketry_runtime::{ServiceContext, Shutdown, connect::{ConnectPolicy, connect_with_backoff}};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let context = ServiceContext::new("assembly-service");
//! context.init_tracing();
//!
//! let policy = ConnectPolicy::default();
//! let _connection = connect_with_backoff("redis", &policy, || async {
//!     Ok::<_, String>("connection")
//! })
//! .await?;
//!
//! let shutdown = Shutdown::new();
//! shutdown.trigger_on_signal();
//! let mut listener = shutdown.listener();
//! listener.wait().await;
//! // stop transports, consumers, producer, stores — in that order
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod connect;
pub mod health;
pub mod metrics;
pub mod shutdown;

pub use connect::{ConnectPolicy, connect_with_backoff};
pub use health::HealthRegistry;
pub use metrics::MetricsRecorder;
pub use shutdown::{DEFAULT_GRACEFUL_TIMEOUT, Shutdown, ShutdownListener};

use chrono::{DateTime, Utc};

/// Immutable per-process context created at init.
///
/// Replaces process-wide globals: the start time is captured once and
/// threaded to whoever reports uptime.
#[derive(Debug, Clone)]
pub struct ServiceContext {
    name: String,
    started_at: DateTime<Utc>,
}

impl ServiceContext {
    /// Capture the context for `name` at the current instant.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), started_at: Utc::now() }
    }

    /// The service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// When the process came up.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Seconds since the process came up.
    #[must_use]
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }

    /// Initialize structured logging for this process.
    ///
    /// Filtering comes from `RUST_LOG`, defaulting to `info`. A subscriber
    /// that is already set (tests) is tolerated.
    pub fn init_tracing(&self) {
        use tracing_subscriber::{EnvFilter, fmt};

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info"));
        let result = fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();
        if result.is_err() {
            tracing::debug!("tracing subscriber already initialized");
        }
        tracing::info!(service = %self.name, "tracing initialized");
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn context_captures_name_and_start_time() {
        let context = ServiceContext::new("order-service");
        assert_eq!(context.name(), "order-service");
        assert!(context.uptime_seconds() >= 0);
        assert!(context.started_at() <= Utc::now());
    }
}
