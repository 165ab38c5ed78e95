//! Error types for identity and session operations.

use rocketry_core::ErrorKind;
use thiserror::Error;

/// Result type alias for IAM operations.
pub type Result<T> = std::result::Result<T, IamError>;

/// Failure taxonomy for the identity layer.
///
/// Variants carry only what a caller may see; the uniform
/// "invalid email or password" message never distinguishes which half was
/// wrong.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IamError {
    /// Wrong email or password (deliberately indistinguishable).
    #[error("invalid email or password")]
    InvalidCredentials,

    /// Account locked after repeated failures.
    #[error("account locked")]
    AccountLocked,

    /// Account exists but is not in the active status.
    #[error("account disabled")]
    AccountDisabled,

    /// Token failed signature, expiry or claim checks.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// Token has been blacklisted.
    #[error("token revoked")]
    TokenRevoked,

    /// Session record absent.
    #[error("session not found")]
    SessionNotFound,

    /// Session past its expiry.
    #[error("session expired")]
    SessionExpired,

    /// Session in a terminal status.
    #[error("session revoked")]
    SessionRevoked,

    /// Refresh token mismatch or past its window.
    #[error("invalid refresh token")]
    InvalidRefreshToken,

    /// Password fails the policy.
    #[error("weak password: {0}")]
    WeakPassword(String),

    /// Malformed input (bad uuid, unknown role).
    #[error("validation error: {0}")]
    Validation(String),

    /// User record absent.
    #[error("user not found")]
    UserNotFound,

    /// Duplicate email.
    #[error("email already registered")]
    DuplicateEmail,

    /// Caller lacks the required permission.
    #[error("permission denied")]
    PermissionDenied,

    /// Storage failure (Redis/Postgres). Retryable.
    #[error("storage error: {0}")]
    Storage(String),

    /// Unexpected state or invariant break.
    #[error("internal error")]
    Internal,
}

impl IamError {
    /// The fabric-wide category this error maps to.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidCredentials
            | Self::AccountLocked
            | Self::InvalidToken(_)
            | Self::TokenRevoked
            | Self::SessionExpired
            | Self::SessionRevoked
            | Self::InvalidRefreshToken => ErrorKind::Unauthenticated,
            Self::AccountDisabled | Self::PermissionDenied => ErrorKind::PermissionDenied,
            Self::WeakPassword(_) | Self::Validation(_) => ErrorKind::Validation,
            Self::SessionNotFound | Self::UserNotFound => ErrorKind::NotFound,
            Self::DuplicateEmail => ErrorKind::Conflict,
            Self::Storage(_) => ErrorKind::Transient,
            Self::Internal => ErrorKind::Internal,
        }
    }
}

impl From<IamError> for tonic::Status {
    fn from(err: IamError) -> Self {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::Validation => Self::invalid_argument(message),
            ErrorKind::NotFound => Self::not_found(message),
            ErrorKind::Unauthenticated => Self::unauthenticated(message),
            ErrorKind::PermissionDenied => Self::permission_denied(message),
            ErrorKind::Conflict => Self::already_exists(message),
            ErrorKind::Transient => Self::unavailable(message),
            ErrorKind::Internal => Self::internal("internal error"),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn credential_failures_are_unauthenticated() {
        assert_eq!(IamError::InvalidCredentials.kind(), ErrorKind::Unauthenticated);
        assert_eq!(IamError::AccountLocked.kind(), ErrorKind::Unauthenticated);
        assert_eq!(IamError::TokenRevoked.kind(), ErrorKind::Unauthenticated);
    }

    #[test]
    fn status_mapping_follows_the_taxonomy() {
        assert_eq!(
            tonic::Status::from(IamError::UserNotFound).code(),
            tonic::Code::NotFound
        );
        assert_eq!(
            tonic::Status::from(IamError::DuplicateEmail).code(),
            tonic::Code::AlreadyExists
        );
        assert_eq!(
            tonic::Status::from(IamError::Storage("redis down".into())).code(),
            tonic::Code::Unavailable
        );
        assert_eq!(
            tonic::Status::from(IamError::WeakPassword("too short".into())).code(),
            tonic::Code::InvalidArgument
        );
    }

    #[test]
    fn internal_errors_do_not_leak_details() {
        let status = tonic::Status::from(IamError::Internal);
        assert_eq!(status.code(), tonic::Code::Internal);
        assert_eq!(status.message(), "internal error");
    }
}
