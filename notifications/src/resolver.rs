//! Recipient resolution through the IAM service.

use async_trait::async_trait;
use rocketry_core::FabricError;
use rocketry_iam::pb;
use rocketry_iam::pb::iam_service_client::IamServiceClient;
use tonic::transport::Channel;
use uuid::Uuid;

/// Resolves a user id to a deliverable channel recipient.
#[async_trait]
pub trait RecipientResolver: Send + Sync {
    /// The Telegram chat id registered for `user_id`.
    ///
    /// # Errors
    ///
    /// `NotFound` when the user has no registered channel; `Transient` on
    /// RPC failure.
    async fn chat_id(&self, user_id: Uuid) -> Result<i64, FabricError>;
}

/// Resolver calling `GetUserTelegramChatId` on IAM.
///
/// Requests authenticate with a service-to-service bearer token.
pub struct IamRecipientResolver {
    client: IamServiceClient<Channel>,
    bearer: String,
}

impl IamRecipientResolver {
    /// Wrap a connected IAM channel and the service's own access token.
    #[must_use]
    pub fn new(channel: Channel, access_token: impl Into<String>) -> Self {
        Self {
            client: IamServiceClient::new(channel),
            bearer: format!("Bearer {}", access_token.into()),
        }
    }
}

#[async_trait]
impl RecipientResolver for IamRecipientResolver {
    async fn chat_id(&self, user_id: Uuid) -> Result<i64, FabricError> {
        let mut request = tonic::Request::new(pb::GetUserTelegramChatIdRequest {
            user_id: user_id.to_string(),
        });
        let bearer = self
            .bearer
            .parse()
            .map_err(|_| FabricError::Internal("malformed bearer token".into()))?;
        request.metadata_mut().insert("authorization", bearer);

        let mut client = self.client.clone();
        match client.get_user_telegram_chat_id(request).await {
            Ok(response) => Ok(response.into_inner().chat_id),
            Err(status) if status.code() == tonic::Code::NotFound => Err(FabricError::NotFound(
                format!("no telegram chat id for user {user_id}"),
            )),
            Err(status) => Err(FabricError::Transient(format!(
                "iam chat id lookup failed: {status}"
            ))),
        }
    }
}
