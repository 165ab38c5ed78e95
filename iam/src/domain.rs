//! User, session and permission domain types.

use crate::error::IamError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// User role, deciding the derived permission set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular customer.
    Customer,
    /// Full administrator.
    Admin,
    /// Assembly-floor operator.
    Operator,
    /// Customer support.
    Support,
}

impl Role {
    /// Stable lower-case encoding, used on the wire and in token claims.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Admin => "admin",
            Self::Operator => "operator",
            Self::Support => "support",
        }
    }

    /// The static permission set derived from this role.
    #[must_use]
    pub const fn permissions(self) -> &'static [&'static str] {
        match self {
            Self::Admin => &["admin:*"],
            Self::Customer => &[
                "orders:create",
                "orders:read",
                "profile:read",
                "profile:update",
            ],
            Self::Operator => &["orders:*", "assembly:*", "users:read"],
            Self::Support => &["users:read", "orders:read", "sessions:read"],
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = IamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "customer" => Ok(Self::Customer),
            "admin" => Ok(Self::Admin),
            "operator" => Ok(Self::Operator),
            "support" => Ok(Self::Support),
            other => Err(IamError::Validation(format!("unknown role: {other}"))),
        }
    }
}

/// Evaluate the permission closure for `role` on `resource`/`action`.
///
/// A permission grants when it is `*`, `resource:*`, `resource:action`, or
/// the super-grant `admin:*`.
#[must_use]
pub fn has_permission(role: Role, resource: &str, action: &str) -> bool {
    role.permissions().iter().any(|p| {
        *p == "*"
            || *p == "admin:*"
            || *p == format!("{resource}:*")
            || *p == format!("{resource}:{action}")
    })
}

/// Account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    /// Allowed to log in.
    Active,
    /// Temporarily disabled.
    Inactive,
    /// Disabled by an operator.
    Suspended,
    /// Soft-deleted; retained for audit.
    Deleted,
}

impl UserStatus {
    /// Stable lower-case encoding.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Suspended => "suspended",
            Self::Deleted => "deleted",
        }
    }
}

impl FromStr for UserStatus {
    type Err = IamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "suspended" => Ok(Self::Suspended),
            "deleted" => Ok(Self::Deleted),
            other => Err(IamError::Validation(format!("unknown user status: {other}"))),
        }
    }
}

/// A user account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// User id.
    pub id: Uuid,
    /// Unique email.
    pub email: String,
    /// Argon2 credentials hash (PHC string).
    pub password_hash: String,
    /// Role deciding the permission set.
    pub role: Role,
    /// Account status.
    pub status: UserStatus,
    /// Consecutive failed login attempts.
    pub login_attempts: u32,
    /// Lock expiry after too many failures.
    pub locked_until: Option<DateTime<Utc>>,
    /// External notification channel id.
    pub telegram_chat_id: Option<i64>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// Last successful login.
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    /// Create an active customer account.
    #[must_use]
    pub fn new(email: impl Into<String>, password_hash: String, role: Role, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            password_hash,
            role,
            status: UserStatus::Active,
            login_attempts: 0,
            locked_until: None,
            telegram_chat_id: None,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        }
    }

    /// Whether the account is currently locked out.
    #[must_use]
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }
}

/// Session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Usable.
    Active,
    /// Past expiry. Terminal.
    Expired,
    /// Revoked by logout or an operator. Terminal.
    Revoked,
    /// Administratively invalidated. Terminal.
    Invalid,
}

impl SessionStatus {
    /// Stable lower-case encoding.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
            Self::Invalid => "invalid",
        }
    }

    /// Whether no transition back to active is accepted.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Expired | Self::Revoked | Self::Invalid)
    }
}

/// An issued, revocable credential record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Session id. Doubles as the access token's `jti`.
    pub id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// Exact access token currently bound to the session.
    pub access_token: String,
    /// Exact refresh token bound to the session.
    pub refresh_token: String,
    /// Client address at login.
    pub ip_address: String,
    /// Client user agent at login.
    pub user_agent: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Access validity horizon; refreshed on token refresh.
    pub expires_at: DateTime<Utc>,
    /// Refresh validity horizon; fixed at creation.
    pub refresh_expires_at: DateTime<Utc>,
    /// Last validation touch.
    pub last_accessed_at: DateTime<Utc>,
    /// Lifecycle status.
    pub status: SessionStatus,
}

impl Session {
    /// Remaining overall validity (the refresh window) from `now`.
    #[must_use]
    pub fn remaining_validity(&self, now: DateTime<Utc>) -> chrono::Duration {
        (self.refresh_expires_at - now).max(chrono::Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn role_roundtrip() {
        for role in [Role::Customer, Role::Admin, Role::Operator, Role::Support] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("wizard".parse::<Role>().is_err());
    }

    #[test]
    fn admin_grant_covers_everything() {
        assert!(has_permission(Role::Admin, "orders", "delete"));
        assert!(has_permission(Role::Admin, "users", "create"));
        assert!(has_permission(Role::Admin, "anything", "at-all"));
    }

    #[test]
    fn customer_permissions_are_scoped() {
        assert!(has_permission(Role::Customer, "orders", "create"));
        assert!(has_permission(Role::Customer, "profile", "update"));
        assert!(!has_permission(Role::Customer, "users", "read"));
        assert!(!has_permission(Role::Customer, "orders", "delete"));
    }

    #[test]
    fn wildcard_resource_grants_all_actions() {
        assert!(has_permission(Role::Operator, "assembly", "start"));
        assert!(has_permission(Role::Operator, "assembly", "abort"));
        assert!(has_permission(Role::Operator, "users", "read"));
        assert!(!has_permission(Role::Operator, "users", "delete"));
    }

    #[test]
    fn lockout_window() {
        let now = Utc::now();
        let mut user = User::new("a@b.c", "hash".into(), Role::Customer, now);
        assert!(!user.is_locked(now));

        user.locked_until = Some(now + chrono::Duration::minutes(15));
        assert!(user.is_locked(now));
        assert!(!user.is_locked(now + chrono::Duration::minutes(16)));
    }

    #[test]
    fn terminal_session_statuses() {
        assert!(!SessionStatus::Active.is_terminal());
        assert!(SessionStatus::Expired.is_terminal());
        assert!(SessionStatus::Revoked.is_terminal());
        assert!(SessionStatus::Invalid.is_terminal());
    }
}
