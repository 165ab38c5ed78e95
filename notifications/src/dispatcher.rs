//! The notification dispatcher: domain events → channel deliveries.

use crate::channel::NotificationChannel;
use crate::resolver::RecipientResolver;
use crate::templates::{Rendered, recipient_user_id, render};
use async_trait::async_trait;
use rocketry_bus::EventHandler;
use rocketry_core::{EventEnvelope, EventType, FabricError};
use std::sync::Arc;
use tracing::{debug, info};

/// Consumes `order.*`, `payment.*` and `assembly.*`, resolves the recipient
/// through IAM and hands the rendered message to the channel adapter.
///
/// Duplicate envelope ids are not deduplicated here; the downstream channel
/// tolerates repeats.
pub struct NotificationDispatcher {
    resolver: Arc<dyn RecipientResolver>,
    channel: Arc<dyn NotificationChannel>,
}

impl NotificationDispatcher {
    /// Assemble the dispatcher from its capabilities.
    #[must_use]
    pub fn new(
        resolver: Arc<dyn RecipientResolver>,
        channel: Arc<dyn NotificationChannel>,
    ) -> Self {
        Self { resolver, channel }
    }
}

#[async_trait]
impl EventHandler for NotificationDispatcher {
    fn supported_topics(&self) -> Vec<String> {
        EventType::ALL
            .into_iter()
            .map(|event_type| event_type.topic().to_string())
            .collect()
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), FabricError> {
        let text = match render(envelope)? {
            Rendered::Message(text) => text,
            Rendered::Skip => {
                debug!(event_id = %envelope.id, event_type = %envelope.event_type, "dropped silently");
                return Ok(());
            }
        };

        let user_id = recipient_user_id(envelope)?;
        let chat_id = match self.resolver.chat_id(user_id).await {
            Ok(chat_id) => chat_id,
            Err(FabricError::NotFound(_)) => {
                // No registered channel is an ordinary state, not a failure.
                debug!(user_id = %user_id, "recipient has no notification channel");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        self.channel.send(chat_id, &text).await?;
        metrics::counter!(
            "notifications_dispatched_total",
            "event_type" => envelope.event_type.as_str()
        )
        .increment(1);
        info!(
            event_id = %envelope.id,
            event_type = %envelope.event_type,
            user_id = %user_id,
            "notification dispatched"
        );
        Ok(())
    }
}
