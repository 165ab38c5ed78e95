//! Assembly domain model.

use chrono::{DateTime, Utc};
use rocketry_core::Quality;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of one assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssemblyStatus {
    /// Allocated, waiting for a concurrency slot.
    Pending,
    /// Holding a slot, build in progress.
    InProgress,
    /// Finished successfully. Terminal.
    Completed,
    /// Failed permanently. Terminal.
    Failed,
}

impl AssemblyStatus {
    /// Whether no further transition is accepted.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Structural role of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    /// Main engine block.
    Engine,
    /// Propellant tank.
    FuelTank,
    /// Guidance and navigation unit.
    Guidance,
    /// Outer hull section.
    Hull,
    /// Fin or stabilizer.
    Stabilizer,
    /// Payload bay.
    PayloadBay,
}

/// Component material, from baseline composites to premium alloys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Material {
    /// Baseline composite.
    Composite,
    /// High-grade aluminum.
    Aluminum,
    /// High-grade steel.
    Steel,
    /// Premium carbon fiber.
    CarbonFiber,
    /// Premium titanium.
    Titanium,
}

impl Material {
    /// Premium materials count toward the premium quality threshold.
    #[must_use]
    pub const fn is_premium(self) -> bool {
        matches!(self, Self::CarbonFiber | Self::Titanium)
    }

    /// High-grade materials count toward the high quality threshold.
    #[must_use]
    pub const fn is_high_grade(self) -> bool {
        matches!(self, Self::Aluminum | Self::Steel)
    }
}

/// How build-critical a component is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    /// Cosmetic or redundant.
    Low,
    /// Standard.
    Medium,
    /// Mission-relevant.
    High,
    /// Mission-critical.
    Critical,
}

/// One component in an assembly's build plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// Component id.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Structural role.
    #[serde(rename = "type")]
    pub kind: ComponentKind,
    /// Material the component is built from.
    pub material: Material,
    /// Build criticality.
    pub criticality: Criticality,
}

/// One rocket assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assembly {
    /// Assembly id.
    pub id: Uuid,
    /// Order this assembly fulfills. At most one active assembly per order.
    pub order_id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// Lifecycle status.
    pub status: AssemblyStatus,
    /// Ordered build plan.
    pub components: Vec<Component>,
    /// Planned duration in seconds.
    pub estimated_duration_seconds: u64,
    /// Wall-clock duration in seconds, set on completion.
    pub actual_duration_seconds: Option<u64>,
    /// Quality grade, derived post-completion.
    pub quality: Option<Quality>,
    /// When the assembly was allocated.
    pub created_at: DateTime<Utc>,
    /// When work started.
    pub started_at: Option<DateTime<Utc>>,
    /// When work completed.
    pub completed_at: Option<DateTime<Utc>>,
    /// When work failed.
    pub failed_at: Option<DateTime<Utc>>,
    /// Failure reason, on the failure path.
    pub failure_reason: Option<String>,
    /// Stable failure code, on the failure path.
    pub error_code: Option<String>,
}

impl Assembly {
    /// Allocate a pending assembly.
    #[must_use]
    pub fn new(
        order_id: Uuid,
        user_id: Uuid,
        components: Vec<Component>,
        estimated_duration_seconds: u64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            user_id,
            status: AssemblyStatus::Pending,
            components,
            estimated_duration_seconds,
            actual_duration_seconds: None,
            quality: None,
            created_at,
            started_at: None,
            completed_at: None,
            failed_at: None,
            failure_reason: None,
            error_code: None,
        }
    }
}

/// The failure catalog: `(reason, code)` pairs drawn uniformly on the
/// failure path.
pub const FAILURE_CATALOG: [(&str, &str); 5] = [
    ("component alignment tolerance exceeded", "ASM_001"),
    ("fuel line pressure test failed", "ASM_002"),
    ("guidance calibration error", "ASM_003"),
    ("structural weld integrity fault", "ASM_004"),
    ("avionics power-on self-test failed", "ASM_005"),
];

/// Derive the quality grade from the component mix.
///
/// Premium when more than half the components use premium materials, high
/// when more than a third use high-grade materials, standard otherwise.
#[must_use]
pub fn derive_quality(components: &[Component]) -> Quality {
    if components.is_empty() {
        return Quality::Standard;
    }
    #[allow(clippy::cast_precision_loss)]
    let total = components.len() as f64;
    let premium = components.iter().filter(|c| c.material.is_premium()).count();
    let high = components.iter().filter(|c| c.material.is_high_grade()).count();

    #[allow(clippy::cast_precision_loss)]
    if premium as f64 / total > 0.5 {
        Quality::Premium
    } else if high as f64 / total > 1.0 / 3.0 {
        Quality::High
    } else {
        Quality::Standard
    }
}
