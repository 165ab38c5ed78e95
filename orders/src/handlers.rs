//! Bus handlers consuming assembly outcomes.

use crate::service::OrderService;
use async_trait::async_trait;
use rocketry_bus::EventHandler;
use rocketry_core::events::{AssemblyCompletedData, AssemblyFailedData};
use rocketry_core::{EventEnvelope, EventType, FabricError};
use std::sync::Arc;
use tracing::{info, warn};

/// Routes `assembly.completed` and `assembly.failed` into order transitions.
pub struct AssemblyEventHandler {
    service: Arc<OrderService>,
}

impl AssemblyEventHandler {
    /// Wrap the order service.
    #[must_use]
    pub const fn new(service: Arc<OrderService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl EventHandler for AssemblyEventHandler {
    fn supported_topics(&self) -> Vec<String> {
        vec![
            EventType::AssemblyCompleted.topic().to_string(),
            EventType::AssemblyFailed.topic().to_string(),
        ]
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), FabricError> {
        match envelope.event_type {
            EventType::AssemblyCompleted => {
                let data: AssemblyCompletedData = envelope.payload().map_err(FabricError::from)?;
                info!(
                    order_id = %data.order_id,
                    quality = ?data.quality,
                    duration_seconds = data.actual_duration_seconds,
                    "assembly completed for order"
                );
                self.service.mark_assembled(data.order_id).await.map(|_| ())
            }
            EventType::AssemblyFailed => {
                let data: AssemblyFailedData = envelope.payload().map_err(FabricError::from)?;
                warn!(
                    order_id = %data.order_id,
                    reason = %data.reason,
                    error_code = %data.error_code,
                    "assembly failed for order"
                );
                self.service.mark_failed(data.order_id, &data.reason).await.map(|_| ())
            }
            other => {
                warn!(event_type = %other, "unexpected event type on assembly topics");
                Ok(())
            }
        }
    }
}
