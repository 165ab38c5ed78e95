//! Service-level dependency health aggregation.

use futures::future::BoxFuture;
use rocketry_core::{HealthReport, HealthStatus};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type HealthCheck = Arc<dyn Fn() -> BoxFuture<'static, HealthStatus> + Send + Sync>;

/// Registry of named dependency health checks.
///
/// Each service registers one check per dependency (broker, cache, database,
/// IAM channel); readiness requires every check to pass.
#[derive(Default, Clone)]
pub struct HealthRegistry {
    checks: Arc<RwLock<BTreeMap<String, HealthCheck>>>,
}

impl HealthRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named dependency check, replacing any prior one.
    pub async fn register<F>(&self, name: impl Into<String>, check: F)
    where
        F: Fn() -> BoxFuture<'static, HealthStatus> + Send + Sync + 'static,
    {
        self.checks.write().await.insert(name.into(), Arc::new(check));
    }

    /// Run every check and aggregate the results.
    pub async fn report(&self) -> HealthReport {
        let checks: Vec<(String, HealthCheck)> = self
            .checks
            .read()
            .await
            .iter()
            .map(|(name, check)| (name.clone(), Arc::clone(check)))
            .collect();

        let mut components = BTreeMap::new();
        for (name, check) in checks {
            components.insert(name, check().await);
        }
        HealthReport::aggregate(components)
    }

    /// Whether every dependency reports healthy.
    pub async fn ready(&self) -> bool {
        self.report().await.status == HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use futures::FutureExt;

    #[tokio::test]
    async fn empty_registry_is_ready() {
        let registry = HealthRegistry::new();
        assert!(registry.ready().await);
    }

    #[tokio::test]
    async fn one_failing_dependency_blocks_readiness() {
        let registry = HealthRegistry::new();
        registry
            .register("broker", || async { HealthStatus::Healthy }.boxed())
            .await;
        registry
            .register("redis", || async { HealthStatus::Unhealthy }.boxed())
            .await;

        let report = registry.report().await;
        assert_eq!(report.status, HealthStatus::Degraded);
        assert!(!registry.ready().await);
        assert_eq!(report.components["broker"], HealthStatus::Healthy);
        assert_eq!(report.components["redis"], HealthStatus::Unhealthy);
    }
}
