//! Prometheus metrics for observability and monitoring.
//!
//! Collects metrics for the fabric components: producer deliveries, consumer
//! throughput and retries, dead-letter volume, saga concurrency, component
//! health. The exporter endpoint itself is wired by each service's
//! deployment; this module owns the recorder.

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics recorder for one service process.
pub struct MetricsRecorder {
    handle: Option<PrometheusHandle>,
}

impl MetricsRecorder {
    /// Install the recorder and register metric descriptions.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError`] if the exporter cannot be built or installed.
    /// A recorder that is already installed (tests construct several) is
    /// tolerated with a warning.
    pub fn install() -> Result<Self, MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                tracing::info!("metrics recorder installed");
                Ok(Self { handle: Some(handle) })
            }
            Err(e) => {
                let message = e.to_string();
                if message.contains("already initialized") {
                    tracing::warn!("metrics recorder already initialized, reusing it");
                    Ok(Self { handle: None })
                } else {
                    Err(MetricsError::Install(message))
                }
            }
        }
    }

    /// Render the current metrics in Prometheus exposition format.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register descriptions for every fabric metric.
fn register_metrics() {
    describe_counter!(
        "bus_producer_messages_total",
        "Messages published synchronously, labeled by result"
    );
    describe_counter!(
        "bus_producer_async_total",
        "Messages published asynchronously, labeled by result"
    );
    describe_counter!(
        "bus_consumer_messages_total",
        "Messages delivered to handlers, labeled by topic and result"
    );
    describe_counter!(
        "bus_consumer_poll_errors_total",
        "Broker poll errors observed by consumers"
    );
    describe_counter!(
        "bus_consumer_dead_lettered_total",
        "Messages routed to dead-letter topics, labeled by origin topic"
    );
    describe_gauge!(
        "bus_component_health",
        "Component health recorded by coordinators (1 healthy, 0 otherwise)"
    );
    describe_gauge!(
        "assembly_in_progress",
        "Assemblies currently holding a concurrency slot"
    );
    describe_counter!(
        "assembly_completed_total",
        "Assemblies finished, labeled by outcome"
    );
    describe_histogram!(
        "assembly_duration_seconds",
        "Wall-clock assembly duration"
    );
    describe_counter!(
        "iam_logins_total",
        "Login attempts, labeled by outcome"
    );
    describe_counter!(
        "notifications_dispatched_total",
        "Notifications handed to the channel adapter, labeled by event type"
    );
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn install_tolerates_duplicate_recorders() {
        // Whichever install wins, neither may error out.
        let first = MetricsRecorder::install();
        let second = MetricsRecorder::install();
        assert!(first.is_ok());
        assert!(second.is_ok());
    }
}
