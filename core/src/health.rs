//! Health reporting contract shared by components and the lifecycle layer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Aggregate health of a component or service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All components operational.
    Healthy,
    /// At least one component unhealthy, but the owner is still running.
    Degraded,
    /// The owner itself is not operational.
    Unhealthy,
}

impl HealthStatus {
    /// Numeric encoding recorded as a gauge (healthy=1, degraded/unhealthy=0).
    #[must_use]
    pub const fn as_gauge(self) -> f64 {
        match self {
            Self::Healthy => 1.0,
            Self::Degraded | Self::Unhealthy => 0.0,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        })
    }
}

/// Per-component health breakdown with an aggregate verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Aggregate status.
    pub status: HealthStatus,
    /// Component name → status, ordered for stable output.
    pub components: BTreeMap<String, HealthStatus>,
}

impl HealthReport {
    /// Aggregate component statuses.
    ///
    /// The owner is `Degraded` when at least one component is unhealthy but
    /// the owner itself keeps running; `Healthy` only when every component
    /// is.
    #[must_use]
    pub fn aggregate(components: BTreeMap<String, HealthStatus>) -> Self {
        let status = if components.values().all(|s| *s == HealthStatus::Healthy) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        Self { status, components }
    }

    /// A report for an owner that is itself down.
    #[must_use]
    pub fn unhealthy(components: BTreeMap<String, HealthStatus>) -> Self {
        Self { status: HealthStatus::Unhealthy, components }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn all_healthy_aggregates_healthy() {
        let mut components = BTreeMap::new();
        components.insert("producer".to_string(), HealthStatus::Healthy);
        components.insert("consumer:orders".to_string(), HealthStatus::Healthy);
        assert_eq!(HealthReport::aggregate(components).status, HealthStatus::Healthy);
    }

    #[test]
    fn one_unhealthy_component_degrades_the_owner() {
        let mut components = BTreeMap::new();
        components.insert("producer".to_string(), HealthStatus::Healthy);
        components.insert("consumer:orders".to_string(), HealthStatus::Unhealthy);
        assert_eq!(HealthReport::aggregate(components).status, HealthStatus::Degraded);
    }

    #[test]
    fn gauge_encoding() {
        assert!((HealthStatus::Healthy.as_gauge() - 1.0).abs() < f64::EPSILON);
        assert!(HealthStatus::Degraded.as_gauge().abs() < f64::EPSILON);
    }
}
