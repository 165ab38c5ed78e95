//! Delivery channel adapters.

use async_trait::async_trait;
use rocketry_core::FabricError;
use serde_json::json;

/// A user-visible delivery channel.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Deliver `text` to the recipient identified by `chat_id`.
    ///
    /// # Errors
    ///
    /// `Transient` failures are retried by the consumer ladder; anything
    /// else dead-letters the message.
    async fn send(&self, chat_id: i64, text: &str) -> Result<(), FabricError>;
}

/// Telegram Bot API adapter.
pub struct TelegramChannel {
    client: reqwest::Client,
    send_message_url: String,
}

impl TelegramChannel {
    /// Create an adapter for a bot token.
    #[must_use]
    pub fn new(bot_token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            send_message_url: format!("https://api.telegram.org/bot{bot_token}/sendMessage"),
        }
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    async fn send(&self, chat_id: i64, text: &str) -> Result<(), FabricError> {
        let response = self
            .client
            .post(&self.send_message_url)
            .json(&json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await
            .map_err(|e| FabricError::Transient(format!("telegram request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() || status.as_u16() == 429 {
            Err(FabricError::Transient(format!(
                "telegram responded {status}: {body}"
            )))
        } else {
            // 4xx means the request itself is bad (unknown chat, malformed
            // payload) and will not improve with retries.
            Err(FabricError::Validation(format!(
                "telegram rejected message ({status}): {body}"
            )))
        }
    }
}

/// Log-only channel for development and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleChannel;

#[async_trait]
impl NotificationChannel for ConsoleChannel {
    async fn send(&self, chat_id: i64, text: &str) -> Result<(), FabricError> {
        tracing::info!(chat_id, text, "notification (console channel)");
        Ok(())
    }
}
