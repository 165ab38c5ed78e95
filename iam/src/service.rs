//! The authentication service: credential validation, token issuance,
//! session lifecycle and account management.

use crate::domain::{Role, Session, SessionStatus, User, UserStatus, has_permission};
use crate::error::{IamError, Result};
use crate::password::{PasswordPolicy, hash_password, verify_password};
use crate::session::{SessionEngine, SessionStore};
use crate::store::UserStore;
use crate::token::{Claims, TokenPair, TokenService};
use chrono::{DateTime, Utc};
use rocketry_core::Clock;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Account-security configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Failed attempts before the account locks.
    pub max_login_attempts: u32,
    /// How long a locked account stays locked.
    pub lockout_time: chrono::Duration,
    /// Password strength policy.
    pub password_policy: PasswordPolicy,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            max_login_attempts: 5,
            lockout_time: chrono::Duration::minutes(15),
            password_policy: PasswordPolicy::default(),
        }
    }
}

/// A successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    /// The issued token pair.
    pub tokens: TokenPair,
    /// The new session's id.
    pub session_id: Uuid,
    /// The authenticated user.
    pub user: User,
}

/// Credential, token, session and account operations behind the IAM RPC
/// surface.
pub struct AuthService {
    users: Arc<dyn UserStore>,
    sessions: SessionEngine,
    tokens: TokenService,
    clock: Arc<dyn Clock>,
    config: AuthConfig,
    /// Hash verified for unknown emails so the miss path costs the same as
    /// a wrong password.
    dummy_hash: String,
}

impl AuthService {
    /// Assemble the service from its capabilities.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::Internal`] if the timing-equalizer hash cannot be
    /// computed.
    pub fn new(
        users: Arc<dyn UserStore>,
        session_store: Arc<dyn SessionStore>,
        tokens: TokenService,
        clock: Arc<dyn Clock>,
        config: AuthConfig,
    ) -> Result<Self> {
        let dummy_hash = hash_password("timing-equalizer")?;
        Ok(Self {
            users,
            sessions: SessionEngine::new(session_store, Arc::clone(&clock)),
            tokens,
            clock,
            config,
            dummy_hash,
        })
    }

    /// The session engine (used by the local interceptor validator).
    #[must_use]
    pub const fn sessions(&self) -> &SessionEngine {
        &self.sessions
    }

    /// Validate an access token's signature and claims (no session lookup).
    ///
    /// # Errors
    ///
    /// Returns [`IamError::InvalidToken`] for a rejected token.
    pub fn validate_access_token(&self, token: &str) -> Result<Claims> {
        self.tokens.validate_access(token)
    }

    /// Credential login.
    ///
    /// The failure message never distinguishes a wrong email from a wrong
    /// password; the unknown-email path still runs an argon2 verification so
    /// both take comparable time.
    ///
    /// # Errors
    ///
    /// [`IamError::InvalidCredentials`] for bad credentials,
    /// [`IamError::AccountLocked`] during a lockout window,
    /// [`IamError::AccountDisabled`] for non-active accounts.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        ip_address: &str,
        user_agent: &str,
    ) -> Result<LoginOutcome> {
        let now = self.clock.now();

        let mut user = match self.users.get_by_email(email).await {
            Ok(user) => user,
            Err(IamError::UserNotFound) => {
                let _ = verify_password(password, &self.dummy_hash);
                metrics::counter!("iam_logins_total", "outcome" => "invalid").increment(1);
                return Err(IamError::InvalidCredentials);
            }
            Err(e) => return Err(e),
        };

        if user.is_locked(now) {
            metrics::counter!("iam_logins_total", "outcome" => "locked").increment(1);
            return Err(IamError::AccountLocked);
        }
        if user.status != UserStatus::Active {
            metrics::counter!("iam_logins_total", "outcome" => "disabled").increment(1);
            return Err(IamError::AccountDisabled);
        }

        if !verify_password(password, &user.password_hash) {
            user.login_attempts += 1;
            if user.login_attempts >= self.config.max_login_attempts {
                user.locked_until = Some(now + self.config.lockout_time);
                warn!(
                    user_id = %user.id,
                    attempts = user.login_attempts,
                    locked_until = ?user.locked_until,
                    "account locked after repeated failures"
                );
            }
            user.updated_at = now;
            self.users.update(&user).await?;
            metrics::counter!("iam_logins_total", "outcome" => "invalid").increment(1);
            return Err(IamError::InvalidCredentials);
        }

        user.login_attempts = 0;
        user.locked_until = None;
        user.last_login_at = Some(now);
        user.updated_at = now;
        self.users.update(&user).await?;

        let session_id = Uuid::new_v4();
        let tokens = self.tokens.issue_pair(&user, session_id, now)?;
        let session = Session {
            id: session_id,
            user_id: user.id,
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            ip_address: ip_address.to_string(),
            user_agent: user_agent.to_string(),
            created_at: now,
            expires_at: tokens.expires_at,
            refresh_expires_at: tokens.refresh_expires_at,
            last_accessed_at: now,
            status: SessionStatus::Active,
        };
        self.sessions.create(&session).await?;

        metrics::counter!("iam_logins_total", "outcome" => "ok").increment(1);
        info!(user_id = %user.id, session_id = %session_id, "login succeeded");
        Ok(LoginOutcome { tokens, session_id, user })
    }

    /// Revoke a session and blacklist its tokens.
    ///
    /// # Errors
    ///
    /// Propagates session-store errors; a missing session is
    /// [`IamError::SessionNotFound`].
    pub async fn logout(&self, session_id: Uuid) -> Result<()> {
        let session = self.sessions.revoke(session_id).await?;
        self.sessions.blacklist_session_tokens(&session).await?;
        info!(session_id = %session_id, "session revoked");
        Ok(())
    }

    /// Exchange a valid refresh token for a fresh access token.
    ///
    /// The stored access token is replaced, so the previous access token
    /// stops validating immediately.
    ///
    /// # Errors
    ///
    /// [`IamError::InvalidRefreshToken`] on mismatch or an elapsed window,
    /// plus session status errors.
    pub async fn refresh(
        &self,
        session_id: Uuid,
        refresh_token: &str,
    ) -> Result<(String, DateTime<Utc>)> {
        let claims = self.tokens.validate_refresh(refresh_token)?;
        if claims.session_uuid()? != session_id {
            return Err(IamError::InvalidRefreshToken);
        }

        let mut session = self.sessions.refresh(session_id, refresh_token).await?;
        let user = self.users.get(session.user_id).await?;
        if user.status != UserStatus::Active {
            return Err(IamError::AccountDisabled);
        }

        let now = self.clock.now();
        let (access_token, expires_at) = self.tokens.issue_access(&user, session_id, now)?;
        session.access_token = access_token.clone();
        session.expires_at = expires_at;
        session.last_accessed_at = now;
        self.sessions.store().update(&session).await?;

        info!(session_id = %session_id, "access token refreshed");
        Ok((access_token, expires_at))
    }

    /// Validate a token/session pair, returning the token claims.
    ///
    /// # Errors
    ///
    /// Token and session validation errors, all `Unauthenticated`-class.
    pub async fn validate_session(&self, session_id: Uuid, access_token: &str) -> Result<Claims> {
        let claims = self.tokens.validate_access(access_token)?;
        if claims.session_uuid()? != session_id {
            return Err(IamError::InvalidToken("token not bound to session".into()));
        }
        self.sessions.validate(session_id, access_token).await?;
        Ok(claims)
    }

    /// Session metadata.
    ///
    /// # Errors
    ///
    /// [`IamError::SessionNotFound`] when absent.
    pub async fn session_info(&self, session_id: Uuid) -> Result<Session> {
        self.sessions.get(session_id).await
    }

    /// Administratively invalidate a session and blacklist its tokens.
    ///
    /// # Errors
    ///
    /// Propagates session-store errors.
    pub async fn invalidate_session(&self, session_id: Uuid) -> Result<()> {
        let session = self.sessions.invalidate(session_id).await?;
        self.sessions.blacklist_session_tokens(&session).await?;
        Ok(())
    }

    /// Create an account.
    ///
    /// # Errors
    ///
    /// [`IamError::WeakPassword`] on policy breach,
    /// [`IamError::DuplicateEmail`] on a taken email,
    /// [`IamError::Validation`] on a malformed email.
    pub async fn create_user(&self, email: &str, password: &str, role: Role) -> Result<User> {
        validate_email(email)?;
        self.config.password_policy.validate(password)?;
        let user = User::new(email, hash_password(password)?, role, self.clock.now());
        self.users.create(&user).await?;
        info!(user_id = %user.id, role = %role, "user created");
        Ok(user)
    }

    /// Fetch an account.
    ///
    /// # Errors
    ///
    /// [`IamError::UserNotFound`] when absent.
    pub async fn get_user(&self, user_id: Uuid) -> Result<User> {
        self.users.get(user_id).await
    }

    /// Update role and/or status.
    ///
    /// # Errors
    ///
    /// [`IamError::UserNotFound`] when absent.
    pub async fn update_user(
        &self,
        user_id: Uuid,
        role: Option<Role>,
        status: Option<UserStatus>,
    ) -> Result<User> {
        let mut user = self.users.get(user_id).await?;
        if let Some(role) = role {
            user.role = role;
        }
        if let Some(status) = status {
            user.status = status;
        }
        user.updated_at = self.clock.now();
        self.users.update(&user).await?;
        Ok(user)
    }

    /// Soft-delete an account and revoke its sessions.
    ///
    /// # Errors
    ///
    /// [`IamError::UserNotFound`] when absent.
    pub async fn delete_user(&self, user_id: Uuid) -> Result<()> {
        self.users.delete(user_id).await?;
        for session_id in self.sessions.store().get_user_sessions(user_id).await? {
            if let Err(e) = self.logout(session_id).await {
                warn!(session_id = %session_id, error = %e, "failed to revoke session of deleted user");
            }
        }
        Ok(())
    }

    /// Page through accounts.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn list_users(&self, limit: u32, offset: u32) -> Result<Vec<User>> {
        self.users.list(limit.clamp(1, 100), offset).await
    }

    /// Change a password, requiring the current one.
    ///
    /// Every other session of the user is revoked afterwards.
    ///
    /// # Errors
    ///
    /// [`IamError::InvalidCredentials`] for a wrong current password,
    /// [`IamError::WeakPassword`] for a weak replacement.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<()> {
        let mut user = self.users.get(user_id).await?;
        if !verify_password(current_password, &user.password_hash) {
            return Err(IamError::InvalidCredentials);
        }
        self.config.password_policy.validate(new_password)?;

        user.password_hash = hash_password(new_password)?;
        user.updated_at = self.clock.now();
        self.users.update(&user).await?;

        for session_id in self.sessions.store().get_user_sessions(user_id).await? {
            if let Err(e) = self.logout(session_id).await {
                warn!(session_id = %session_id, error = %e, "failed to revoke session after password change");
            }
        }
        info!(user_id = %user_id, "password changed");
        Ok(())
    }

    /// Update profile fields of the calling user.
    ///
    /// # Errors
    ///
    /// [`IamError::Validation`] on a malformed email.
    pub async fn update_profile(&self, user_id: Uuid, email: Option<String>) -> Result<User> {
        let mut user = self.users.get(user_id).await?;
        if let Some(email) = email {
            validate_email(&email)?;
            user.email = email;
        }
        user.updated_at = self.clock.now();
        self.users.update(&user).await?;
        Ok(user)
    }

    /// Evaluate the permission closure for a user.
    ///
    /// # Errors
    ///
    /// [`IamError::UserNotFound`] when absent.
    pub async fn check_permission(
        &self,
        user_id: Uuid,
        resource: &str,
        action: &str,
    ) -> Result<bool> {
        let user = self.users.get(user_id).await?;
        Ok(has_permission(user.role, resource, action))
    }

    /// The static permission set of a user's role.
    ///
    /// # Errors
    ///
    /// [`IamError::UserNotFound`] when absent.
    pub async fn user_permissions(&self, user_id: Uuid) -> Result<Vec<String>> {
        let user = self.users.get(user_id).await?;
        Ok(user
            .role
            .permissions()
            .iter()
            .map(ToString::to_string)
            .collect())
    }

    /// The user's Telegram chat id.
    ///
    /// # Errors
    ///
    /// [`IamError::UserNotFound`] when the user is absent or no chat id is
    /// registered.
    pub async fn telegram_chat_id(&self, user_id: Uuid) -> Result<i64> {
        let user = self.users.get(user_id).await?;
        user.telegram_chat_id.ok_or(IamError::UserNotFound)
    }

    /// Register or replace the user's Telegram chat id.
    ///
    /// # Errors
    ///
    /// [`IamError::UserNotFound`] when absent.
    pub async fn update_telegram_chat_id(&self, user_id: Uuid, chat_id: i64) -> Result<()> {
        let mut user = self.users.get(user_id).await?;
        user.telegram_chat_id = Some(chat_id);
        user.updated_at = self.clock.now();
        self.users.update(&user).await
    }

    /// Sweep expired blacklist entries. Run periodically.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn cleanup_blacklist(&self) -> Result<usize> {
        self.sessions.store().cleanup_blacklist().await
    }
}

fn validate_email(email: &str) -> Result<()> {
    let valid = email.len() <= 254
        && email.split_once('@').is_some_and(|(local, domain)| {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        });
    if valid {
        Ok(())
    } else {
        Err(IamError::Validation("malformed email address".into()))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn email_validation() {
        assert!(validate_email("pilot@example.com").is_ok());
        assert!(validate_email("a@b.co").is_ok());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@nodot").is_err());
    }
}
