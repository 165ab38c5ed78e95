//! # Rocketry IAM
//!
//! Identity and session layer shared by every Rocketry service.
//!
//! - [`token`]: HMAC-SHA-256 bearer tokens (access + refresh pairs)
//! - [`session`]: session record lifecycle, validation semantics and the
//!   token blacklist
//! - [`store`]: Redis session store and Postgres user store
//! - [`service`]: login/lockout/refresh/account flows behind the RPC surface
//! - [`rpc`]: the tonic service plus [`interceptor`]'s
//!   recovery → logging → auth chain applied to it
//!
//! # Architecture
//!
//! ```text
//!        ┌────────────┐  ValidateSession   ┌─────────────────┐
//!        │ other svc  │───────────────────►│   IAM service   │
//!        │ interceptor│                    │  (this crate)   │
//!        └────────────┘                    └───────┬─────────┘
//!                                                  │
//!                              ┌───────────────────┼──────────────┐
//!                              ▼                   ▼              ▼
//!                        TokenService       RedisSessionStore  Postgres
//!                        (HS256 JWTs)       (records, blacklist) (users)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod domain;
pub mod error;
pub mod interceptor;
pub mod password;
pub mod rpc;
pub mod service;
pub mod session;
pub mod store;
pub mod token;

#[cfg(feature = "test-utils")]
pub mod mocks;

/// Generated protocol definitions (`iam.v1`).
pub mod pb {
    #![allow(missing_docs, clippy::pedantic, clippy::missing_const_for_fn)]
    tonic::include_proto!("iam.v1");
}

pub use domain::{Role, Session, SessionStatus, User, UserStatus, has_permission};
pub use error::{IamError, Result};
pub use interceptor::{AuthContext, AuthLayer, LoggingLayer, RecoveryLayer, SessionValidator};
pub use service::{AuthConfig, AuthService, LoginOutcome};
pub use session::{SessionEngine, SessionStore};
pub use store::{PostgresUserStore, RedisSessionStore, UserStore};
pub use token::{Claims, TokenConfig, TokenPair, TokenService};
