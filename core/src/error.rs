//! Error taxonomy shared across the service fabric.
//!
//! Every fallible operation in the fabric classifies its failures into one of
//! the [`ErrorKind`] categories. The classification is load-bearing: the
//! consumer retry ladder retries `Transient` only, validation failures skip
//! the ladder entirely, and the RPC layer maps each kind to a status code.

use thiserror::Error;

/// Failure categories recognized by the fabric.
///
/// The category decides how a failure propagates: whether it is retried,
/// routed to a dead-letter topic, or surfaced to the caller as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input or a business-rule breach. Never retried.
    Validation,
    /// A referenced entity does not exist.
    NotFound,
    /// Missing or invalid credentials.
    Unauthenticated,
    /// Valid credentials without sufficient rights.
    PermissionDenied,
    /// A uniqueness or concurrency conflict (duplicate email, duplicate consumer name).
    Conflict,
    /// Broker/DB/network hiccup, serialization failure, timeout. Retried.
    Transient,
    /// Panic, unexpected state, invariant break. Logged, surfaced generically.
    Internal,
}

impl ErrorKind {
    /// Whether the retry ladder may re-attempt a failure of this kind.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Stable lower-case encoding used in logs and failure metadata headers.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Unauthenticated => "unauthenticated",
            Self::PermissionDenied => "permission_denied",
            Self::Conflict => "conflict",
            Self::Transient => "transient",
            Self::Internal => "internal",
        }
    }
}

/// A classified fabric error.
///
/// Message handlers and saga processors return this type so the bus can make
/// retry/DLQ decisions without knowing the failure's origin.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FabricError {
    /// Malformed input or business-rule breach.
    #[error("validation error: {0}")]
    Validation(String),

    /// Absent user/session/order/assembly.
    #[error("not found: {0}")]
    NotFound(String),

    /// Credential failure.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Insufficient rights.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Duplicate or conflicting state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Recoverable infrastructure failure.
    #[error("transient error: {0}")]
    Transient(String),

    /// Unexpected state or invariant break.
    #[error("internal error: {0}")]
    Internal(String),
}

impl FabricError {
    /// The category this error belongs to.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Unauthenticated(_) => ErrorKind::Unauthenticated,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Transient(_) => ErrorKind::Transient,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the retry ladder may re-attempt this error.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn only_transient_is_retryable() {
        assert!(FabricError::Transient("broker down".into()).is_retryable());
        assert!(!FabricError::Validation("bad payload".into()).is_retryable());
        assert!(!FabricError::NotFound("no such order".into()).is_retryable());
        assert!(!FabricError::Internal("invariant".into()).is_retryable());
    }

    #[test]
    fn kind_encoding_is_stable() {
        assert_eq!(ErrorKind::Validation.as_str(), "validation");
        assert_eq!(ErrorKind::Transient.as_str(), "transient");
        assert_eq!(ErrorKind::PermissionDenied.as_str(), "permission_denied");
    }
}
