//! gRPC surface over [`AuthService`].
//!
//! Handler bodies translate between protobuf messages and domain types;
//! every error path goes through the [`IamError`] → status mapping so the
//! taxonomy in the error module is the single source of truth.

use crate::domain::{Role, UserStatus, has_permission};
use crate::error::IamError;
use crate::interceptor::{AuthContext, AuthLayer, LocalSessionValidator, LoggingLayer, RecoveryLayer};
use crate::pb;
use crate::pb::iam_service_server::{IamService, IamServiceServer};
use crate::service::AuthService;
use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use std::sync::Arc;
use tonic::{Request, Response, Status};
use uuid::Uuid;

/// The IAM gRPC service implementation.
pub struct IamGrpc {
    service: Arc<AuthService>,
}

impl IamGrpc {
    /// Wrap the auth service.
    #[must_use]
    pub const fn new(service: Arc<AuthService>) -> Self {
        Self { service }
    }

    /// Wrap into the generated tonic server type.
    #[must_use]
    pub fn into_server(self) -> IamServiceServer<Self> {
        IamServiceServer::new(self)
    }
}

/// Serve the IAM surface with the full interceptor chain
/// (recovery → logging → auth) until `shutdown` resolves.
///
/// # Errors
///
/// Returns the transport error if the server fails to bind or serve.
pub async fn serve(
    addr: SocketAddr,
    service: Arc<AuthService>,
    shutdown: impl std::future::Future<Output = ()> + Send,
) -> Result<(), tonic::transport::Error> {
    let validator = Arc::new(LocalSessionValidator::new(Arc::clone(&service)));
    let auth = AuthLayer::new(validator, AuthLayer::default_skip_list());

    tonic::transport::Server::builder()
        .layer(RecoveryLayer)
        .layer(LoggingLayer)
        .layer(auth)
        .add_service(IamGrpc::new(service).into_server())
        .serve_with_shutdown(addr, shutdown)
        .await
}

fn auth_context<T>(request: &Request<T>) -> Result<AuthContext, Status> {
    request
        .extensions()
        .get::<AuthContext>()
        .cloned()
        .ok_or_else(|| Status::unauthenticated("missing auth context"))
}

fn require(context: &AuthContext, resource: &str, action: &str) -> Result<(), Status> {
    if has_permission(context.user_role, resource, action) {
        Ok(())
    } else {
        Err(IamError::PermissionDenied.into())
    }
}

fn parse_uuid(value: &str, field: &str) -> Result<Uuid, Status> {
    Uuid::parse_str(value)
        .map_err(|_| Status::invalid_argument(format!("malformed {field}")))
}

fn rfc3339(time: DateTime<Utc>) -> String {
    time.to_rfc3339()
}

fn user_response(user: &crate::domain::User) -> pb::UserResponse {
    pb::UserResponse {
        user_id: user.id.to_string(),
        email: user.email.clone(),
        role: user.role.as_str().to_string(),
        status: user.status.as_str().to_string(),
        created_at: rfc3339(user.created_at),
        last_login_at: user.last_login_at.map(rfc3339),
    }
}

#[tonic::async_trait]
impl IamService for IamGrpc {
    async fn login(
        &self,
        request: Request<pb::LoginRequest>,
    ) -> Result<Response<pb::LoginResponse>, Status> {
        let message = request.into_inner();
        let outcome = self
            .service
            .login(
                &message.email,
                &message.password,
                &message.ip_address,
                &message.user_agent,
            )
            .await?;
        Ok(Response::new(pb::LoginResponse {
            access_token: outcome.tokens.access_token,
            refresh_token: outcome.tokens.refresh_token,
            session_id: outcome.session_id.to_string(),
            user_id: outcome.user.id.to_string(),
            role: outcome.user.role.as_str().to_string(),
            expires_at: rfc3339(outcome.tokens.expires_at),
        }))
    }

    async fn logout(
        &self,
        request: Request<pb::LogoutRequest>,
    ) -> Result<Response<pb::LogoutResponse>, Status> {
        let context = auth_context(&request)?;
        let message = request.into_inner();
        // An empty session id means "log out the calling session".
        let session_id = if message.session_id.is_empty() {
            context.session_id
        } else {
            parse_uuid(&message.session_id, "session_id")?
        };
        if session_id != context.session_id {
            require(&context, "sessions", "revoke")?;
        }
        self.service.logout(session_id).await?;
        Ok(Response::new(pb::LogoutResponse { success: true }))
    }

    async fn refresh_token(
        &self,
        request: Request<pb::RefreshTokenRequest>,
    ) -> Result<Response<pb::RefreshTokenResponse>, Status> {
        let message = request.into_inner();
        let session_id = parse_uuid(&message.session_id, "session_id")?;
        let (access_token, expires_at) =
            self.service.refresh(session_id, &message.refresh_token).await?;
        Ok(Response::new(pb::RefreshTokenResponse {
            access_token,
            expires_at: rfc3339(expires_at),
        }))
    }

    async fn validate_session(
        &self,
        request: Request<pb::ValidateSessionRequest>,
    ) -> Result<Response<pb::ValidateSessionResponse>, Status> {
        let message = request.into_inner();
        // Server-to-server callers may omit the session id; the token's
        // session claim is authoritative in that case.
        let session_id = if message.session_id.is_empty() {
            self.service
                .validate_access_token(&message.access_token)?
                .session_uuid()?
        } else {
            parse_uuid(&message.session_id, "session_id")?
        };
        let claims = self
            .service
            .validate_session(session_id, &message.access_token)
            .await?;
        Ok(Response::new(pb::ValidateSessionResponse {
            valid: true,
            user_id: claims.user_id,
            role: claims.role,
            session_id: session_id.to_string(),
        }))
    }

    async fn get_session_info(
        &self,
        request: Request<pb::GetSessionInfoRequest>,
    ) -> Result<Response<pb::GetSessionInfoResponse>, Status> {
        let context = auth_context(&request)?;
        let message = request.into_inner();
        let session_id = parse_uuid(&message.session_id, "session_id")?;

        let session = self.service.session_info(session_id).await?;
        if session.user_id != context.user_id {
            require(&context, "sessions", "read")?;
        }
        Ok(Response::new(pb::GetSessionInfoResponse {
            session_id: session.id.to_string(),
            user_id: session.user_id.to_string(),
            status: session.status.as_str().to_string(),
            created_at: rfc3339(session.created_at),
            expires_at: rfc3339(session.expires_at),
            last_accessed_at: rfc3339(session.last_accessed_at),
            ip_address: session.ip_address,
            user_agent: session.user_agent,
        }))
    }

    async fn invalidate_session(
        &self,
        request: Request<pb::InvalidateSessionRequest>,
    ) -> Result<Response<pb::InvalidateSessionResponse>, Status> {
        let context = auth_context(&request)?;
        require(&context, "sessions", "revoke")?;
        let message = request.into_inner();
        let session_id = parse_uuid(&message.session_id, "session_id")?;
        self.service.invalidate_session(session_id).await?;
        Ok(Response::new(pb::InvalidateSessionResponse { success: true }))
    }

    async fn create_user(
        &self,
        request: Request<pb::CreateUserRequest>,
    ) -> Result<Response<pb::UserResponse>, Status> {
        let context = auth_context(&request)?;
        require(&context, "users", "create")?;
        let message = request.into_inner();
        let role: Role = message.role.parse::<Role>().map_err(Status::from)?;
        let user = self
            .service
            .create_user(&message.email, &message.password, role)
            .await?;
        Ok(Response::new(user_response(&user)))
    }

    async fn get_user(
        &self,
        request: Request<pb::GetUserRequest>,
    ) -> Result<Response<pb::UserResponse>, Status> {
        let context = auth_context(&request)?;
        let message = request.into_inner();
        let user_id = parse_uuid(&message.user_id, "user_id")?;
        if user_id != context.user_id {
            require(&context, "users", "read")?;
        }
        let user = self.service.get_user(user_id).await?;
        Ok(Response::new(user_response(&user)))
    }

    async fn update_user(
        &self,
        request: Request<pb::UpdateUserRequest>,
    ) -> Result<Response<pb::UserResponse>, Status> {
        let context = auth_context(&request)?;
        require(&context, "users", "update")?;
        let message = request.into_inner();
        let user_id = parse_uuid(&message.user_id, "user_id")?;
        let role = message
            .role
            .map(|r| r.parse::<Role>())
            .transpose()
            .map_err(Status::from)?;
        let status = message
            .status
            .map(|s| s.parse::<UserStatus>())
            .transpose()
            .map_err(Status::from)?;
        let user = self.service.update_user(user_id, role, status).await?;
        Ok(Response::new(user_response(&user)))
    }

    async fn delete_user(
        &self,
        request: Request<pb::DeleteUserRequest>,
    ) -> Result<Response<pb::DeleteUserResponse>, Status> {
        let context = auth_context(&request)?;
        require(&context, "users", "delete")?;
        let message = request.into_inner();
        let user_id = parse_uuid(&message.user_id, "user_id")?;
        self.service.delete_user(user_id).await?;
        Ok(Response::new(pb::DeleteUserResponse { success: true }))
    }

    async fn list_users(
        &self,
        request: Request<pb::ListUsersRequest>,
    ) -> Result<Response<pb::ListUsersResponse>, Status> {
        let context = auth_context(&request)?;
        require(&context, "users", "read")?;
        let message = request.into_inner();
        let users = self.service.list_users(message.limit, message.offset).await?;
        Ok(Response::new(pb::ListUsersResponse {
            users: users.iter().map(user_response).collect(),
        }))
    }

    async fn change_password(
        &self,
        request: Request<pb::ChangePasswordRequest>,
    ) -> Result<Response<pb::ChangePasswordResponse>, Status> {
        let context = auth_context(&request)?;
        let message = request.into_inner();
        self.service
            .change_password(context.user_id, &message.current_password, &message.new_password)
            .await?;
        Ok(Response::new(pb::ChangePasswordResponse { success: true }))
    }

    async fn get_profile(
        &self,
        request: Request<pb::GetProfileRequest>,
    ) -> Result<Response<pb::UserResponse>, Status> {
        let context = auth_context(&request)?;
        let user = self.service.get_user(context.user_id).await?;
        Ok(Response::new(user_response(&user)))
    }

    async fn update_profile(
        &self,
        request: Request<pb::UpdateProfileRequest>,
    ) -> Result<Response<pb::UserResponse>, Status> {
        let context = auth_context(&request)?;
        let message = request.into_inner();
        let user = self.service.update_profile(context.user_id, message.email).await?;
        Ok(Response::new(user_response(&user)))
    }

    async fn check_permission(
        &self,
        request: Request<pb::CheckPermissionRequest>,
    ) -> Result<Response<pb::CheckPermissionResponse>, Status> {
        let _context = auth_context(&request)?;
        let message = request.into_inner();
        let user_id = parse_uuid(&message.user_id, "user_id")?;
        let allowed = self
            .service
            .check_permission(user_id, &message.resource, &message.action)
            .await?;
        Ok(Response::new(pb::CheckPermissionResponse { allowed }))
    }

    async fn get_user_permissions(
        &self,
        request: Request<pb::GetUserPermissionsRequest>,
    ) -> Result<Response<pb::GetUserPermissionsResponse>, Status> {
        let context = auth_context(&request)?;
        let message = request.into_inner();
        let user_id = parse_uuid(&message.user_id, "user_id")?;
        if user_id != context.user_id {
            require(&context, "users", "read")?;
        }
        let permissions = self.service.user_permissions(user_id).await?;
        Ok(Response::new(pb::GetUserPermissionsResponse { permissions }))
    }

    async fn get_user_telegram_chat_id(
        &self,
        request: Request<pb::GetUserTelegramChatIdRequest>,
    ) -> Result<Response<pb::GetUserTelegramChatIdResponse>, Status> {
        let _context = auth_context(&request)?;
        let message = request.into_inner();
        let user_id = parse_uuid(&message.user_id, "user_id")?;
        let chat_id = self.service.telegram_chat_id(user_id).await?;
        Ok(Response::new(pb::GetUserTelegramChatIdResponse { chat_id }))
    }

    async fn update_telegram_chat_id(
        &self,
        request: Request<pb::UpdateTelegramChatIdRequest>,
    ) -> Result<Response<pb::UpdateTelegramChatIdResponse>, Status> {
        let context = auth_context(&request)?;
        let message = request.into_inner();
        let user_id = parse_uuid(&message.user_id, "user_id")?;
        if user_id != context.user_id {
            require(&context, "users", "update")?;
        }
        self.service.update_telegram_chat_id(user_id, message.chat_id).await?;
        Ok(Response::new(pb::UpdateTelegramChatIdResponse { success: true }))
    }
}
