//! Password policy and credential hashing.

use crate::error::{IamError, Result};
use argon2::password_hash::{PasswordHash, SaltString, rand_core::OsRng};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};

/// Password strength policy.
#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    /// Minimum length in characters.
    pub min_length: usize,
    /// Whether a symbol is additionally required.
    pub require_symbols: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self { min_length: 8, require_symbols: false }
    }
}

impl PasswordPolicy {
    /// Check a candidate password against the policy.
    ///
    /// Requires at least one upper-case letter, one lower-case letter and
    /// one digit; symbols only when configured.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::WeakPassword`] naming the first unmet rule.
    pub fn validate(&self, password: &str) -> Result<()> {
        if password.chars().count() < self.min_length {
            return Err(IamError::WeakPassword(format!(
                "must be at least {} characters",
                self.min_length
            )));
        }
        if !password.chars().any(char::is_uppercase) {
            return Err(IamError::WeakPassword("must contain an upper-case letter".into()));
        }
        if !password.chars().any(char::is_lowercase) {
            return Err(IamError::WeakPassword("must contain a lower-case letter".into()));
        }
        if !password.chars().any(|c| c.is_ascii_digit()) {
            return Err(IamError::WeakPassword("must contain a digit".into()));
        }
        if self.require_symbols && password.chars().all(char::is_alphanumeric) {
            return Err(IamError::WeakPassword("must contain a symbol".into()));
        }
        Ok(())
    }
}

/// Hash a password with argon2id and a fresh salt.
///
/// # Errors
///
/// Returns [`IamError::Internal`] if hashing fails.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            tracing::error!(error = %e, "password hashing failed");
            IamError::Internal
        })
}

/// Verify a password against a stored PHC hash.
///
/// Verification time is dominated by the argon2 computation, so success and
/// failure take the same time for a given hash.
#[must_use]
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn policy_accepts_compliant_passwords() {
        let policy = PasswordPolicy::default();
        assert!(policy.validate("P@ssw0rd!").is_ok());
        assert!(policy.validate("Abcdefg1").is_ok());
    }

    #[test]
    fn policy_rejects_each_missing_rule() {
        let policy = PasswordPolicy::default();
        assert!(matches!(policy.validate("Ab1"), Err(IamError::WeakPassword(_))));
        assert!(matches!(policy.validate("abcdefg1"), Err(IamError::WeakPassword(_))));
        assert!(matches!(policy.validate("ABCDEFG1"), Err(IamError::WeakPassword(_))));
        assert!(matches!(policy.validate("Abcdefgh"), Err(IamError::WeakPassword(_))));
    }

    #[test]
    fn symbols_only_when_configured() {
        let strict = PasswordPolicy { min_length: 8, require_symbols: true };
        assert!(matches!(strict.validate("Abcdefg1"), Err(IamError::WeakPassword(_))));
        assert!(strict.validate("Abcdefg1!").is_ok());
    }

    #[test]
    fn hash_and_verify_roundtrip() {
        let hash = hash_password("P@ssw0rd!").unwrap();
        assert!(verify_password("P@ssw0rd!", &hash));
        assert!(!verify_password("wrong-password", &hash));
    }

    #[test]
    fn hashes_are_salted() {
        let first = hash_password("P@ssw0rd!").unwrap();
        let second = hash_password("P@ssw0rd!").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn malformed_stored_hash_never_verifies() {
        assert!(!verify_password("P@ssw0rd!", "not-a-phc-string"));
    }
}
