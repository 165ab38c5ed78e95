//! Session record lifecycle and validation semantics.
//!
//! The [`SessionStore`] trait is the storage seam (Redis in production,
//! in-memory in tests); [`SessionEngine`] layers the validation semantics on
//! top: status checks, expiry, exact token matching, the blacklist, and the
//! terminal-status invariant.

use crate::domain::{Session, SessionStatus};
use crate::error::{IamError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use constant_time_eq::constant_time_eq;
use rocketry_core::Clock;
use std::sync::Arc;
use uuid::Uuid;

/// Storage seam for session records and the token blacklist.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Write a new record with TTL equal to its remaining validity, plus the
    /// metadata hash and set memberships, atomically.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::Validation`] when the id already exists (session
    /// fixation prevention) and [`IamError::Storage`] on transport failure.
    async fn create(&self, session: &Session) -> Result<()>;

    /// Fetch one record.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::SessionNotFound`] when absent.
    async fn get(&self, session_id: Uuid) -> Result<Session>;

    /// Replace a record, refreshing its TTL from the remaining validity.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::SessionNotFound`] when absent.
    async fn update(&self, session: &Session) -> Result<()>;

    /// Remove a record and its index memberships.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::Storage`] on transport failure.
    async fn delete(&self, session_id: Uuid) -> Result<()>;

    /// Session ids currently tracked for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::Storage`] on transport failure.
    async fn get_user_sessions(&self, user_id: Uuid) -> Result<Vec<Uuid>>;

    /// Blacklist a token id until `expires_at`.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::Storage`] on transport failure.
    async fn blacklist(&self, token_id: &str, expires_at: DateTime<Utc>) -> Result<()>;

    /// Whether a token id is currently blacklisted.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::Storage`] on transport failure.
    async fn is_blacklisted(&self, token_id: &str) -> Result<bool>;

    /// Drop blacklist index entries whose sentinel has expired. Returns the
    /// number removed.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::Storage`] on transport failure.
    async fn cleanup_blacklist(&self) -> Result<usize>;
}

/// Validation and lifecycle semantics over a [`SessionStore`].
pub struct SessionEngine {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
}

impl SessionEngine {
    /// Wrap a store.
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Persist a freshly issued session.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn create(&self, session: &Session) -> Result<()> {
        self.store.create(session).await
    }

    /// Fetch one session.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn get(&self, session_id: Uuid) -> Result<Session> {
        self.store.get(session_id).await
    }

    /// Validate a session against a presented access token.
    ///
    /// Succeeds iff the session is active, unexpired, the stored access
    /// token matches exactly (constant-time) and the token id is not
    /// blacklisted. On success `last_accessed_at` is touched on a background
    /// task.
    ///
    /// # Errors
    ///
    /// One of [`IamError::SessionNotFound`], [`IamError::SessionExpired`],
    /// [`IamError::SessionRevoked`], [`IamError::InvalidToken`] or
    /// [`IamError::TokenRevoked`].
    pub async fn validate(&self, session_id: Uuid, access_token: &str) -> Result<Session> {
        let session = self.store.get(session_id).await?;
        let now = self.clock.now();

        match session.status {
            SessionStatus::Active => {}
            SessionStatus::Expired => return Err(IamError::SessionExpired),
            SessionStatus::Revoked | SessionStatus::Invalid => {
                return Err(IamError::SessionRevoked);
            }
        }

        // The store TTL covers the refresh window; the access horizon is
        // enforced here. The record is left untouched: an access-expired
        // session must remain refreshable until its refresh horizon.
        if now >= session.expires_at {
            return Err(IamError::SessionExpired);
        }

        if !constant_time_eq(session.access_token.as_bytes(), access_token.as_bytes()) {
            return Err(IamError::InvalidToken("access token mismatch".into()));
        }

        if self.store.is_blacklisted(&session.id.to_string()).await? {
            return Err(IamError::TokenRevoked);
        }

        let mut touched = session.clone();
        touched.last_accessed_at = now;
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(e) = store.update(&touched).await {
                tracing::debug!(error = %e, "last-access touch failed");
            }
        });

        Ok(session)
    }

    /// Validate the refresh preconditions and return the session for token
    /// re-issuance.
    ///
    /// # Errors
    ///
    /// [`IamError::InvalidRefreshToken`] on mismatch or an elapsed refresh
    /// window, plus the status errors of [`validate`](Self::validate).
    pub async fn refresh(&self, session_id: Uuid, refresh_token: &str) -> Result<Session> {
        let session = self.store.get(session_id).await?;
        let now = self.clock.now();

        match session.status {
            SessionStatus::Active => {}
            SessionStatus::Expired => return Err(IamError::SessionExpired),
            SessionStatus::Revoked | SessionStatus::Invalid => {
                return Err(IamError::SessionRevoked);
            }
        }
        if now >= session.refresh_expires_at {
            return Err(IamError::InvalidRefreshToken);
        }
        if !constant_time_eq(session.refresh_token.as_bytes(), refresh_token.as_bytes()) {
            return Err(IamError::InvalidRefreshToken);
        }
        if self
            .store
            .is_blacklisted(&format!("{}_refresh", session.id))
            .await?
        {
            return Err(IamError::TokenRevoked);
        }
        Ok(session)
    }

    /// Move a session to a terminal status. The record is retained until its
    /// TTL so enumeration stays consistent.
    ///
    /// A session already in the requested status is left untouched; any
    /// other transition out of a terminal status is rejected — a revoked
    /// session can never become active again.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::Validation`] for a terminal-to-different-status
    /// transition and store errors otherwise.
    pub async fn update_status(&self, session_id: Uuid, status: SessionStatus) -> Result<Session> {
        let mut session = self.store.get(session_id).await?;
        if session.status == status {
            return Ok(session);
        }
        if session.status.is_terminal() {
            return Err(IamError::Validation(format!(
                "session in terminal status {} cannot become {}",
                session.status.as_str(),
                status.as_str()
            )));
        }
        session.status = status;
        self.store.update(&session).await?;
        Ok(session)
    }

    /// Revoke a session (logout or administrative action).
    ///
    /// # Errors
    ///
    /// Propagates [`update_status`](Self::update_status) errors.
    pub async fn revoke(&self, session_id: Uuid) -> Result<Session> {
        self.update_status(session_id, SessionStatus::Revoked).await
    }

    /// Mark a session expired.
    ///
    /// # Errors
    ///
    /// Propagates [`update_status`](Self::update_status) errors.
    pub async fn expire(&self, session_id: Uuid) -> Result<Session> {
        self.update_status(session_id, SessionStatus::Expired).await
    }

    /// Administratively invalidate a session.
    ///
    /// # Errors
    ///
    /// Propagates [`update_status`](Self::update_status) errors.
    pub async fn invalidate(&self, session_id: Uuid) -> Result<Session> {
        self.update_status(session_id, SessionStatus::Invalid).await
    }

    /// Blacklist both token ids of a session until their expiry.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn blacklist_session_tokens(&self, session: &Session) -> Result<()> {
        self.store
            .blacklist(&session.id.to_string(), session.expires_at)
            .await?;
        self.store
            .blacklist(
                &format!("{}_refresh", session.id),
                session.refresh_expires_at,
            )
            .await
    }
}
