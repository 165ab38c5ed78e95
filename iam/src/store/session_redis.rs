//! Redis-based session store.
//!
//! # Layout
//!
//! - `session:{session_id}` → JSON record, TTL = remaining validity
//! - `session_meta:{session_id}` → hash of scalar fields for cheap lookup
//! - `user_sessions:{user_id}` → set of session ids
//! - `active_sessions` → set of session ids
//! - `blacklist_token:{token_id}` → sentinel, TTL = token remaining life
//! - `blacklisted_tokens` → set of blacklisted token ids
//!
//! Multi-key writes go through an atomic pipeline so a record can never
//! exist without its index memberships, or the other way around.

use crate::domain::Session;
use crate::error::{IamError, Result};
use crate::session::SessionStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use uuid::Uuid;

/// Buffer added to index-set TTLs so they outlive their members.
const SET_TTL_BUFFER_SECONDS: i64 = 86_400;
/// Key of the all-active-sessions set.
const ACTIVE_SESSIONS_KEY: &str = "active_sessions";
/// Key of the blacklisted-token index set.
const BLACKLISTED_TOKENS_KEY: &str = "blacklisted_tokens";

/// Session store backed by Redis with TTL-based expiration.
#[derive(Clone)]
pub struct RedisSessionStore {
    conn_manager: ConnectionManager,
}

impl RedisSessionStore {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::Storage`] if the connection cannot be
    /// established.
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| IamError::Storage(format!("failed to create redis client: {e}")))?;
        let conn_manager = ConnectionManager::new(client)
            .await
            .map_err(|e| IamError::Storage(format!("failed to connect to redis: {e}")))?;
        Ok(Self { conn_manager })
    }

    fn session_key(session_id: Uuid) -> String {
        format!("session:{session_id}")
    }

    fn meta_key(session_id: Uuid) -> String {
        format!("session_meta:{session_id}")
    }

    fn user_sessions_key(user_id: Uuid) -> String {
        format!("user_sessions:{user_id}")
    }

    fn blacklist_key(token_id: &str) -> String {
        format!("blacklist_token:{token_id}")
    }

    /// Ping the server.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::Storage`] when the server does not answer.
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| IamError::Storage(format!("redis ping failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn create(&self, session: &Session) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let session_key = Self::session_key(session.id);

        // Reject duplicate ids outright: accepting one would let an attacker
        // pre-plant a session id (session fixation).
        let exists: bool = conn
            .exists(&session_key)
            .await
            .map_err(|e| IamError::Storage(format!("failed to check session existence: {e}")))?;
        if exists {
            return Err(IamError::Validation("session id already exists".into()));
        }

        let record = serde_json::to_string(session).map_err(|e| {
            IamError::Storage(format!("failed to serialize session: {e}"))
        })?;

        #[allow(clippy::cast_sign_loss)]
        let ttl_seconds = session.remaining_validity(Utc::now()).num_seconds().max(1) as u64;
        #[allow(clippy::cast_possible_wrap)]
        let set_ttl_seconds = ttl_seconds as i64 + SET_TTL_BUFFER_SECONDS;

        let meta_key = Self::meta_key(session.id);
        let user_sessions_key = Self::user_sessions_key(session.user_id);
        let id = session.id.to_string();

        let _: () = redis::pipe()
            .atomic()
            .set_ex(&session_key, record, ttl_seconds)
            .hset_multiple(
                &meta_key,
                &[
                    ("user_id", session.user_id.to_string()),
                    ("created_at", session.created_at.to_rfc3339()),
                    ("expires_at", session.expires_at.to_rfc3339()),
                    ("ip", session.ip_address.clone()),
                    ("ua", session.user_agent.clone()),
                    ("status", session.status.as_str().to_string()),
                ],
            )
            .ignore()
            .expire(&meta_key, set_ttl_seconds)
            .ignore()
            .sadd(&user_sessions_key, &id)
            .ignore()
            .expire(&user_sessions_key, set_ttl_seconds)
            .ignore()
            .sadd(ACTIVE_SESSIONS_KEY, &id)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| IamError::Storage(format!("failed to create session: {e}")))?;

        tracing::info!(
            session_id = %session.id,
            user_id = %session.user_id,
            ttl_seconds,
            "session created"
        );
        Ok(())
    }

    async fn get(&self, session_id: Uuid) -> Result<Session> {
        let mut conn = self.conn_manager.clone();
        let record: Option<String> = conn
            .get(Self::session_key(session_id))
            .await
            .map_err(|e| IamError::Storage(format!("failed to get session: {e}")))?;

        let Some(record) = record else {
            return Err(IamError::SessionNotFound);
        };
        let session: Session = serde_json::from_str(&record)
            .map_err(|e| IamError::Storage(format!("failed to parse session record: {e}")))?;

        // The TTL should have removed this already; the in-memory check
        // guards against clock skew and eviction-policy surprises.
        if Utc::now() >= session.refresh_expires_at {
            tracing::warn!(
                session_id = %session_id,
                refresh_expires_at = %session.refresh_expires_at,
                "session past its refresh window still present in redis"
            );
            return Err(IamError::SessionExpired);
        }
        Ok(session)
    }

    async fn update(&self, session: &Session) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let session_key = Self::session_key(session.id);

        let exists: bool = conn
            .exists(&session_key)
            .await
            .map_err(|e| IamError::Storage(format!("failed to check session existence: {e}")))?;
        if !exists {
            return Err(IamError::SessionNotFound);
        }

        let record = serde_json::to_string(session).map_err(|e| {
            IamError::Storage(format!("failed to serialize session: {e}"))
        })?;
        #[allow(clippy::cast_sign_loss)]
        let ttl_seconds = session.remaining_validity(Utc::now()).num_seconds().max(1) as u64;

        let meta_key = Self::meta_key(session.id);
        let id = session.id.to_string();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .set_ex(&session_key, record, ttl_seconds)
            .hset(&meta_key, "status", session.status.as_str())
            .ignore()
            .hset(&meta_key, "expires_at", session.expires_at.to_rfc3339())
            .ignore();
        if session.status.is_terminal() {
            pipe.srem(ACTIVE_SESSIONS_KEY, &id).ignore();
        }
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| IamError::Storage(format!("failed to update session: {e}")))?;

        tracing::debug!(session_id = %session.id, status = session.status.as_str(), "session updated");
        Ok(())
    }

    async fn delete(&self, session_id: Uuid) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let id = session_id.to_string();

        let user_sessions_key = match self.get(session_id).await {
            Ok(session) => Some(Self::user_sessions_key(session.user_id)),
            Err(IamError::SessionNotFound | IamError::SessionExpired) => None,
            Err(e) => return Err(e),
        };

        let mut pipe = redis::pipe();
        pipe.atomic()
            .del(Self::session_key(session_id))
            .ignore()
            .del(Self::meta_key(session_id))
            .ignore()
            .srem(ACTIVE_SESSIONS_KEY, &id)
            .ignore();
        if let Some(key) = user_sessions_key {
            pipe.srem(&key, &id).ignore();
        }
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| IamError::Storage(format!("failed to delete session: {e}")))?;

        tracing::info!(session_id = %session_id, "session deleted");
        Ok(())
    }

    async fn get_user_sessions(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        let mut conn = self.conn_manager.clone();
        let user_sessions_key = Self::user_sessions_key(user_id);

        let ids: Vec<String> = conn
            .smembers(&user_sessions_key)
            .await
            .map_err(|e| IamError::Storage(format!("failed to list user sessions: {e}")))?;

        // Expired records leave dead references behind; drop them as we go
        // so the set does not grow without bound.
        let mut live = Vec::new();
        for id in ids {
            let Ok(session_id) = Uuid::parse_str(&id) else {
                continue;
            };
            let exists: bool = conn
                .exists(Self::session_key(session_id))
                .await
                .map_err(|e| IamError::Storage(format!("failed to check session: {e}")))?;
            if exists {
                live.push(session_id);
            } else {
                let _: std::result::Result<(), _> = conn.srem(&user_sessions_key, &id).await;
            }
        }
        Ok(live)
    }

    async fn blacklist(&self, token_id: &str, expires_at: DateTime<Utc>) -> Result<()> {
        let remaining = (expires_at - Utc::now()).num_seconds();
        if remaining <= 0 {
            // An already-expired token needs no sentinel.
            return Ok(());
        }
        let mut conn = self.conn_manager.clone();
        #[allow(clippy::cast_sign_loss)]
        let _: () = redis::pipe()
            .atomic()
            .set_ex(Self::blacklist_key(token_id), 1, remaining as u64)
            .sadd(BLACKLISTED_TOKENS_KEY, token_id)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| IamError::Storage(format!("failed to blacklist token: {e}")))?;

        tracing::info!(token_id, remaining_seconds = remaining, "token blacklisted");
        Ok(())
    }

    async fn is_blacklisted(&self, token_id: &str) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        conn.exists(Self::blacklist_key(token_id))
            .await
            .map_err(|e| IamError::Storage(format!("failed to check blacklist: {e}")))
    }

    async fn cleanup_blacklist(&self) -> Result<usize> {
        let mut conn = self.conn_manager.clone();
        let token_ids: Vec<String> = conn
            .smembers(BLACKLISTED_TOKENS_KEY)
            .await
            .map_err(|e| IamError::Storage(format!("failed to list blacklist: {e}")))?;

        let mut removed = 0;
        for token_id in token_ids {
            let exists: bool = conn
                .exists(Self::blacklist_key(&token_id))
                .await
                .map_err(|e| IamError::Storage(format!("failed to check sentinel: {e}")))?;
            if !exists {
                let _: std::result::Result<(), _> =
                    conn.srem(BLACKLISTED_TOKENS_KEY, &token_id).await;
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::debug!(removed, "cleaned up expired blacklist entries");
        }
        Ok(removed)
    }
}
