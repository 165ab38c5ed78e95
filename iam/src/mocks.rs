//! In-memory stores for tests.
//!
//! Gated behind the `test-utils` feature (on by default) so service tests
//! and downstream crates can exercise the full auth flows without Redis or
//! Postgres.

use crate::domain::{Session, User, UserStatus};
use crate::error::{IamError, Result};
use crate::session::SessionStore;
use crate::store::UserStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory [`SessionStore`] with explicit expiry bookkeeping.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<Uuid, Session>>,
    blacklist: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl InMemorySessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions (expired included).
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, session: &Session) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(IamError::Validation("session id already exists".into()));
        }
        sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn get(&self, session_id: Uuid) -> Result<Session> {
        let sessions = self.sessions.read().await;
        let session = sessions.get(&session_id).ok_or(IamError::SessionNotFound)?;
        if Utc::now() >= session.refresh_expires_at {
            return Err(IamError::SessionExpired);
        }
        Ok(session.clone())
    }

    async fn update(&self, session: &Session) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if !sessions.contains_key(&session.id) {
            return Err(IamError::SessionNotFound);
        }
        sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn delete(&self, session_id: Uuid) -> Result<()> {
        self.sessions.write().await.remove(&session_id);
        Ok(())
    }

    async fn get_user_sessions(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.id)
            .collect())
    }

    async fn blacklist(&self, token_id: &str, expires_at: DateTime<Utc>) -> Result<()> {
        if expires_at > Utc::now() {
            self.blacklist
                .write()
                .await
                .insert(token_id.to_string(), expires_at);
        }
        Ok(())
    }

    async fn is_blacklisted(&self, token_id: &str) -> Result<bool> {
        Ok(self
            .blacklist
            .read()
            .await
            .get(token_id)
            .is_some_and(|expires_at| *expires_at > Utc::now()))
    }

    async fn cleanup_blacklist(&self) -> Result<usize> {
        let mut blacklist = self.blacklist.write().await;
        let before = blacklist.len();
        blacklist.retain(|_, expires_at| *expires_at > Utc::now());
        Ok(before - blacklist.len())
    }
}

/// In-memory [`UserStore`].
#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryUserStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn create(&self, user: &User) -> Result<()> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) {
            return Err(IamError::DuplicateEmail);
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get(&self, user_id: Uuid) -> Result<User> {
        self.users
            .read()
            .await
            .get(&user_id)
            .cloned()
            .ok_or(IamError::UserNotFound)
    }

    async fn get_by_email(&self, email: &str) -> Result<User> {
        self.users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(IamError::UserNotFound)
    }

    async fn update(&self, user: &User) -> Result<()> {
        let mut users = self.users.write().await;
        if !users.contains_key(&user.id) {
            return Err(IamError::UserNotFound);
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn delete(&self, user_id: Uuid) -> Result<()> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&user_id).ok_or(IamError::UserNotFound)?;
        user.status = UserStatus::Deleted;
        Ok(())
    }

    async fn list(&self, limit: u32, offset: u32) -> Result<Vec<User>> {
        let users = self.users.read().await;
        let mut all: Vec<User> = users
            .values()
            .filter(|u| u.status != UserStatus::Deleted)
            .cloned()
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }
}
