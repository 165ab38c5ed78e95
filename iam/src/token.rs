//! Signed-token issuance and validation.
//!
//! Tokens are HMAC-SHA-256 JWTs. The access token's `jti` is the session id;
//! the refresh token's `jti` is the session id with a `_refresh` suffix, so
//! the blacklist can target either half of the pair independently.

use crate::domain::{Role, User};
use crate::error::{IamError, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Minimum signing-secret length in bytes.
const MIN_SECRET_BYTES: usize = 32;
/// Suffix distinguishing refresh-token `jti`s.
const REFRESH_JTI_SUFFIX: &str = "_refresh";

/// Claims carried by every issued token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id.
    pub sub: String,
    /// Token id: session id, `_refresh`-suffixed for refresh tokens.
    pub jti: String,
    /// Owning user id.
    pub user_id: String,
    /// Bound session id.
    pub session_id: String,
    /// Role encoding at issuance time.
    pub role: String,
    /// Email at issuance time.
    pub email: String,
    /// Issued-at (unix seconds).
    pub iat: i64,
    /// Expiry (unix seconds).
    pub exp: i64,
    /// Not-before (unix seconds).
    pub nbf: i64,
    /// Issuer.
    pub iss: String,
}

impl Claims {
    /// Parse the user id claim.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::InvalidToken`] on a malformed id.
    pub fn user_uuid(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.user_id)
            .map_err(|_| IamError::InvalidToken("malformed user_id claim".into()))
    }

    /// Parse the session id claim.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::InvalidToken`] on a malformed id.
    pub fn session_uuid(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.session_id)
            .map_err(|_| IamError::InvalidToken("malformed session_id claim".into()))
    }

    /// Parse the role claim.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::Validation`] on an unknown role.
    pub fn parsed_role(&self) -> Result<Role> {
        self.role.parse()
    }
}

/// An issued access/refresh pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    /// Short-lived access token.
    pub access_token: String,
    /// Longer-lived refresh token.
    pub refresh_token: String,
    /// Access token expiry.
    pub expires_at: DateTime<Utc>,
    /// Refresh token expiry.
    pub refresh_expires_at: DateTime<Utc>,
}

/// Token issuance/validation configuration.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// HMAC signing secret, at least 32 bytes.
    pub secret: String,
    /// Issuer stamped into and required from every token.
    pub issuer: String,
    /// Access token lifetime.
    pub access_ttl: Duration,
    /// Refresh token lifetime.
    pub refresh_ttl: Duration,
}

impl TokenConfig {
    /// Sensible defaults around a provided secret: 15 minute access tokens,
    /// 24 hour refresh tokens.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            issuer: "rocketry-iam".to_string(),
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::hours(24),
        }
    }
}

/// Issues and validates the fabric's bearer tokens.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    config: TokenConfig,
}

impl TokenService {
    /// Create a service, enforcing the minimum secret length.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::Validation`] for a secret shorter than 32 bytes.
    pub fn new(config: TokenConfig) -> Result<Self> {
        if config.secret.len() < MIN_SECRET_BYTES {
            return Err(IamError::Validation(format!(
                "signing secret must be at least {MIN_SECRET_BYTES} bytes"
            )));
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            config,
        })
    }

    /// The configured access-token lifetime.
    #[must_use]
    pub const fn access_ttl(&self) -> Duration {
        self.config.access_ttl
    }

    /// The configured refresh-token lifetime.
    #[must_use]
    pub const fn refresh_ttl(&self) -> Duration {
        self.config.refresh_ttl
    }

    /// Issue an access/refresh pair bound to `session_id`.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::Internal`] if signing fails.
    pub fn issue_pair(&self, user: &User, session_id: Uuid, now: DateTime<Utc>) -> Result<TokenPair> {
        let expires_at = now + self.config.access_ttl;
        let refresh_expires_at = now + self.config.refresh_ttl;

        let access_token =
            self.sign(user, session_id, session_id.to_string(), now, expires_at)?;
        let refresh_token = self.sign(
            user,
            session_id,
            format!("{session_id}{REFRESH_JTI_SUFFIX}"),
            now,
            refresh_expires_at,
        )?;

        Ok(TokenPair { access_token, refresh_token, expires_at, refresh_expires_at })
    }

    /// Issue a fresh access token for an existing session (refresh path).
    ///
    /// # Errors
    ///
    /// Returns [`IamError::Internal`] if signing fails.
    pub fn issue_access(
        &self,
        user: &User,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(String, DateTime<Utc>)> {
        let expires_at = now + self.config.access_ttl;
        let token = self.sign(user, session_id, session_id.to_string(), now, expires_at)?;
        Ok((token, expires_at))
    }

    fn sign(
        &self,
        user: &User,
        session_id: Uuid,
        jti: String,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<String> {
        let claims = Claims {
            sub: user.id.to_string(),
            jti,
            user_id: user.id.to_string(),
            session_id: session_id.to_string(),
            role: user.role.as_str().to_string(),
            email: user.email.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            nbf: now.timestamp(),
            iss: self.config.issuer.clone(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|e| {
            tracing::error!(error = %e, "token signing failed");
            IamError::Internal
        })
    }

    /// Validate an access token: signature, algorithm, expiry, issuer and
    /// the presence of the binding claims.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::InvalidToken`] for any rejected token, including
    /// a refresh token presented as an access token.
    pub fn validate_access(&self, token: &str) -> Result<Claims> {
        let claims = self.decode_claims(token)?;
        if claims.jti.ends_with(REFRESH_JTI_SUFFIX) {
            return Err(IamError::InvalidToken(
                "refresh token presented as access token".into(),
            ));
        }
        Ok(claims)
    }

    /// Validate a refresh token, requiring the `_refresh` `jti` suffix.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::InvalidToken`] for any rejected token.
    pub fn validate_refresh(&self, token: &str) -> Result<Claims> {
        let claims = self.decode_claims(token)?;
        if !claims.jti.ends_with(REFRESH_JTI_SUFFIX) {
            return Err(IamError::InvalidToken("not a refresh token".into()));
        }
        Ok(claims)
    }

    fn decode_claims(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            use jsonwebtoken::errors::ErrorKind as JwtError;
            match e.kind() {
                JwtError::ExpiredSignature => IamError::InvalidToken("token expired".into()),
                JwtError::InvalidAlgorithm => {
                    IamError::InvalidToken("wrong signing method".into())
                }
                _ => IamError::InvalidToken("token rejected".into()),
            }
        })?;

        let claims = data.claims;
        if claims.user_id.is_empty() || claims.session_id.is_empty() {
            return Err(IamError::InvalidToken(
                "missing user_id or session_id claim".into(),
            ));
        }
        Ok(claims)
    }
}
