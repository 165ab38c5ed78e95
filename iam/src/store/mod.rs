//! Storage implementations for users and sessions.

pub mod session_redis;
pub mod user_postgres;

pub use session_redis::RedisSessionStore;
pub use user_postgres::PostgresUserStore;

use crate::domain::User;
use crate::error::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Storage seam for user accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new account.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::DuplicateEmail`](crate::error::IamError::DuplicateEmail)
    /// when the email is taken.
    async fn create(&self, user: &User) -> Result<()>;

    /// Fetch by id.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::UserNotFound`](crate::error::IamError::UserNotFound)
    /// when absent.
    async fn get(&self, user_id: Uuid) -> Result<User>;

    /// Fetch by email (indexed lookup).
    ///
    /// # Errors
    ///
    /// Returns [`IamError::UserNotFound`](crate::error::IamError::UserNotFound)
    /// when absent.
    async fn get_by_email(&self, email: &str) -> Result<User>;

    /// Replace an existing account record.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::UserNotFound`](crate::error::IamError::UserNotFound)
    /// when absent.
    async fn update(&self, user: &User) -> Result<()>;

    /// Soft-delete an account (status becomes `deleted`).
    ///
    /// # Errors
    ///
    /// Returns [`IamError::UserNotFound`](crate::error::IamError::UserNotFound)
    /// when absent.
    async fn delete(&self, user_id: Uuid) -> Result<()>;

    /// Page through accounts, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::Storage`](crate::error::IamError::Storage) on
    /// transport failure.
    async fn list(&self, limit: u32, offset: u32) -> Result<Vec<User>>;
}
