//! Per-RPC interceptor chain: recovery → logging → auth.
//!
//! The three layers wrap the tonic server as tower middleware, outermost
//! first:
//!
//! 1. **recovery** catches handler panics, logs them and answers `Internal`
//!    instead of tearing down the connection;
//! 2. **logging** opens one tracing span per RPC and records the latency;
//! 3. **auth** extracts the bearer credential (and `x-session-id` where
//!    present), validates it through a [`SessionValidator`], and injects the
//!    resulting [`AuthContext`] into the request extensions. Paths on the
//!    skip list (health probes, `Login`, `RefreshToken`) pass through.
//!
//! ```no_run
//! use rocketry_iam::interceptor::{AuthLayer, LoggingLayer, RecoveryLayer};
//! # fn example(validator: std::sync::Arc<dyn rocketry_iam::interceptor::SessionValidator>) {
//! let auth = AuthLayer::new(validator, AuthLayer::default_skip_list());
//! let builder = tonic::transport::Server::builder()
//!     .layer(RecoveryLayer)
//!     .layer(LoggingLayer)
//!     .layer(auth);
//! # }
//! ```

use crate::domain::Role;
use crate::error::IamError;
use crate::service::AuthService;
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use http::{HeaderValue, Request, Response};
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tonic::body::BoxBody;
use tower::{Layer, Service};
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

/// Authenticated caller identity, injected into request extensions.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Authenticated user.
    pub user_id: Uuid,
    /// Role at token issuance.
    pub user_role: Role,
    /// Validated session.
    pub session_id: Uuid,
}

/// Capability to validate a presented credential.
///
/// The IAM service validates locally; every other service holds a client
/// that calls `ValidateSession` on IAM.
#[async_trait]
pub trait SessionValidator: Send + Sync {
    /// Validate an access token (and session binding, when known).
    ///
    /// # Errors
    ///
    /// Returns an `Unauthenticated`-class [`IamError`] on any failure.
    async fn validate(
        &self,
        access_token: &str,
        session_id: Option<Uuid>,
    ) -> Result<AuthContext, IamError>;
}

/// Validator backed by the in-process [`AuthService`].
pub struct LocalSessionValidator {
    service: Arc<AuthService>,
}

impl LocalSessionValidator {
    /// Wrap the auth service.
    #[must_use]
    pub const fn new(service: Arc<AuthService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl SessionValidator for LocalSessionValidator {
    async fn validate(
        &self,
        access_token: &str,
        session_id: Option<Uuid>,
    ) -> Result<AuthContext, IamError> {
        // The token is self-describing; a missing x-session-id falls back to
        // its session claim.
        let claims = self.service.validate_access_token(access_token)?;
        let session_id = match session_id {
            Some(session_id) => session_id,
            None => claims.session_uuid()?,
        };
        let claims = self.service.validate_session(session_id, access_token).await?;
        Ok(AuthContext {
            user_id: claims.user_uuid()?,
            user_role: claims.parsed_role()?,
            session_id,
        })
    }
}

/// Validator calling `ValidateSession` on the IAM service.
pub struct RemoteSessionValidator {
    client: crate::pb::iam_service_client::IamServiceClient<tonic::transport::Channel>,
}

impl RemoteSessionValidator {
    /// Wrap a connected IAM channel.
    #[must_use]
    pub fn new(channel: tonic::transport::Channel) -> Self {
        Self {
            client: crate::pb::iam_service_client::IamServiceClient::new(channel),
        }
    }
}

#[async_trait]
impl SessionValidator for RemoteSessionValidator {
    async fn validate(
        &self,
        access_token: &str,
        session_id: Option<Uuid>,
    ) -> Result<AuthContext, IamError> {
        let mut client = self.client.clone();
        let response = client
            .validate_session(crate::pb::ValidateSessionRequest {
                session_id: session_id.map(|id| id.to_string()).unwrap_or_default(),
                access_token: access_token.to_string(),
            })
            .await
            .map_err(|status| IamError::InvalidToken(status.message().to_string()))?
            .into_inner();

        if !response.valid {
            return Err(IamError::InvalidToken("session rejected".into()));
        }
        Ok(AuthContext {
            user_id: Uuid::parse_str(&response.user_id)
                .map_err(|_| IamError::InvalidToken("malformed user id".into()))?,
            user_role: response.role.parse()?,
            session_id: Uuid::parse_str(&response.session_id)
                .map_err(|_| IamError::InvalidToken("malformed session id".into()))?,
        })
    }
}

/// Build a gRPC error response without going through a handler.
fn status_response(status: &tonic::Status) -> Response<BoxBody> {
    let mut response = Response::new(tonic::body::empty_body());
    response
        .headers_mut()
        .insert(http::header::CONTENT_TYPE, HeaderValue::from_static("application/grpc"));
    let code = HeaderValue::from_str(&(status.code() as i32).to_string())
        .unwrap_or_else(|_| HeaderValue::from_static("13"));
    response.headers_mut().insert("grpc-status", code);
    if let Ok(message) = HeaderValue::from_str(status.message()) {
        response.headers_mut().insert("grpc-message", message);
    }
    response
}

/// Extract the bearer credential from an `authorization` header value.
fn extract_bearer(header: Option<&HeaderValue>) -> Option<&str> {
    header
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
}

// ─── Recovery ────────────────────────────────────────────────────────────

/// Outermost layer: panics become `Internal`, not dropped connections.
#[derive(Debug, Clone, Copy)]
pub struct RecoveryLayer;

impl<S> Layer<S> for RecoveryLayer {
    type Service = RecoveryMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RecoveryMiddleware { inner }
    }
}

/// See [`RecoveryLayer`].
#[derive(Debug, Clone)]
pub struct RecoveryMiddleware<S> {
    inner: S,
}

impl<S, B> Service<Request<B>> for RecoveryMiddleware<S>
where
    S: Service<Request<B>, Response = Response<BoxBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<B>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let path = request.uri().path().to_string();

        Box::pin(async move {
            match AssertUnwindSafe(inner.call(request)).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(ToString::to_string)
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!(
                        path = %path,
                        panic = %message,
                        backtrace = %std::backtrace::Backtrace::force_capture(),
                        "handler panicked"
                    );
                    Ok(status_response(&tonic::Status::internal("internal error")))
                }
            }
        })
    }
}

// ─── Logging ─────────────────────────────────────────────────────────────

/// One tracing span per RPC, with latency and grpc-status on completion.
#[derive(Debug, Clone, Copy)]
pub struct LoggingLayer;

impl<S> Layer<S> for LoggingLayer {
    type Service = LoggingMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoggingMiddleware { inner }
    }
}

/// See [`LoggingLayer`].
#[derive(Debug, Clone)]
pub struct LoggingMiddleware<S> {
    inner: S,
}

impl<S, B> Service<Request<B>> for LoggingMiddleware<S>
where
    S: Service<Request<B>, Response = Response<BoxBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<B>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let path = request.uri().path().to_string();
        let span = info_span!("rpc", path = %path);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = inner.call(request).await;
                let elapsed_ms = start.elapsed().as_millis() as u64;
                match &result {
                    Ok(response) => {
                        let grpc_status = response
                            .headers()
                            .get("grpc-status")
                            .and_then(|value| value.to_str().ok())
                            .unwrap_or("0")
                            .to_string();
                        info!(elapsed_ms, grpc_status = %grpc_status, "rpc completed");
                    }
                    Err(_) => warn!(elapsed_ms, "rpc transport error"),
                }
                result
            }
            .instrument(span),
        )
    }
}

// ─── Auth ────────────────────────────────────────────────────────────────

/// Innermost layer: credential extraction and session validation.
#[derive(Clone)]
pub struct AuthLayer {
    validator: Arc<dyn SessionValidator>,
    skip: Arc<HashSet<String>>,
}

impl AuthLayer {
    /// Create the layer with an explicit skip list of full gRPC paths.
    #[must_use]
    pub fn new(validator: Arc<dyn SessionValidator>, skip: HashSet<String>) -> Self {
        Self { validator, skip: Arc::new(skip) }
    }

    /// The standard skip list: health probes plus the RPCs that establish
    /// credentials in the first place.
    #[must_use]
    pub fn default_skip_list() -> HashSet<String> {
        [
            "/iam.v1.IamService/Login",
            "/iam.v1.IamService/RefreshToken",
            "/grpc.health.v1.Health/Check",
            "/grpc.health.v1.Health/Watch",
        ]
        .into_iter()
        .map(ToString::to_string)
        .collect()
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            validator: Arc::clone(&self.validator),
            skip: Arc::clone(&self.skip),
        }
    }
}

/// See [`AuthLayer`].
#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    validator: Arc<dyn SessionValidator>,
    skip: Arc<HashSet<String>>,
}

impl<S, B> Service<Request<B>> for AuthMiddleware<S>
where
    S: Service<Request<B>, Response = Response<BoxBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<B>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let validator = Arc::clone(&self.validator);
        let skip = Arc::clone(&self.skip);

        Box::pin(async move {
            let path = request.uri().path();
            if skip.contains(path) {
                return inner.call(request).await;
            }

            let Some(token) = extract_bearer(request.headers().get(http::header::AUTHORIZATION))
            else {
                return Ok(status_response(&tonic::Status::unauthenticated(
                    "missing bearer credential",
                )));
            };
            let token = token.to_string();

            let session_id = request
                .headers()
                .get("x-session-id")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| Uuid::parse_str(value).ok());

            match validator.validate(&token, session_id).await {
                Ok(context) => {
                    request.extensions_mut().insert(context);
                    inner.call(request).await
                }
                Err(e) => {
                    warn!(path = %request.uri().path(), error = %e, "authentication failed");
                    Ok(status_response(&tonic::Status::unauthenticated(e.to_string())))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn bearer_extraction() {
        let value = HeaderValue::from_static("Bearer abc.def.ghi");
        assert_eq!(extract_bearer(Some(&value)), Some("abc.def.ghi"));

        let wrong_scheme = HeaderValue::from_static("Basic abc");
        assert_eq!(extract_bearer(Some(&wrong_scheme)), None);

        let empty = HeaderValue::from_static("Bearer ");
        assert_eq!(extract_bearer(Some(&empty)), None);
        assert_eq!(extract_bearer(None), None);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn status_response_carries_grpc_headers() {
        let response = status_response(&tonic::Status::unauthenticated("nope"));
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .unwrap()
                .to_string()
        };
        assert_eq!(
            header("grpc-status"),
            (tonic::Code::Unauthenticated as i32).to_string()
        );
        assert_eq!(header("grpc-message"), "nope");
        assert_eq!(header("content-type"), "application/grpc");
    }

    #[test]
    fn default_skip_list_covers_credential_establishment() {
        let skip = AuthLayer::default_skip_list();
        assert!(skip.contains("/iam.v1.IamService/Login"));
        assert!(skip.contains("/iam.v1.IamService/RefreshToken"));
        assert!(skip.contains("/grpc.health.v1.Health/Check"));
        assert!(!skip.contains("/iam.v1.IamService/GetProfile"));
    }
}
