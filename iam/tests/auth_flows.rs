//! End-to-end auth flows over the in-memory stores.

#![allow(clippy::unwrap_used)]

use chrono::{Duration, Utc};
use rocketry_core::Clock;
use rocketry_iam::mocks::{InMemorySessionStore, InMemoryUserStore};
use rocketry_iam::{AuthConfig, AuthService, IamError, Role, TokenConfig, TokenService};
use rocketry_testing::FixedClock;
use std::sync::Arc;

const SECRET: &str = "an-hmac-secret-of-at-least-32-bytes!";
const PASSWORD: &str = "P@ssw0rd!";

fn clock() -> Arc<FixedClock> {
    // Anchor at the real present so JWT expiry checks (which use system
    // time) agree with the fixture clock until it is advanced.
    Arc::new(FixedClock::new(Utc::now()))
}

fn service_with(clock: &Arc<FixedClock>, config: AuthConfig) -> AuthService {
    AuthService::new(
        Arc::new(InMemoryUserStore::new()),
        Arc::new(InMemorySessionStore::new()),
        TokenService::new(TokenConfig::new(SECRET)).unwrap(),
        Arc::clone(clock) as Arc<dyn rocketry_core::Clock>,
        config,
    )
    .unwrap()
}

#[tokio::test]
async fn login_issues_a_validatable_session() {
    let clock = clock();
    let service = service_with(&clock, AuthConfig::default());
    let user = service
        .create_user("pilot@example.com", PASSWORD, Role::Customer)
        .await
        .unwrap();

    let outcome = service
        .login("pilot@example.com", PASSWORD, "127.0.0.1", "test-agent")
        .await
        .unwrap();
    assert_eq!(outcome.user.id, user.id);

    let claims = service
        .validate_session(outcome.session_id, &outcome.tokens.access_token)
        .await
        .unwrap();
    assert_eq!(claims.user_uuid().unwrap(), user.id);
    assert_eq!(claims.parsed_role().unwrap(), Role::Customer);
}

#[tokio::test]
async fn wrong_password_and_unknown_email_are_indistinguishable() {
    let clock = clock();
    let service = service_with(&clock, AuthConfig::default());
    service
        .create_user("pilot@example.com", PASSWORD, Role::Customer)
        .await
        .unwrap();

    let wrong_password = service
        .login("pilot@example.com", "Wr0ngPass!", "127.0.0.1", "ua")
        .await
        .unwrap_err();
    let unknown_email = service
        .login("ghost@example.com", PASSWORD, "127.0.0.1", "ua")
        .await
        .unwrap_err();

    assert_eq!(wrong_password, IamError::InvalidCredentials);
    assert_eq!(unknown_email, IamError::InvalidCredentials);
    assert_eq!(wrong_password.to_string(), unknown_email.to_string());
}

#[tokio::test]
async fn repeated_failures_lock_the_account_until_the_window_passes() {
    let clock = clock();
    let config = AuthConfig {
        max_login_attempts: 5,
        lockout_time: Duration::minutes(15),
        ..AuthConfig::default()
    };
    let service = service_with(&clock, config);
    service
        .create_user("pilot@example.com", PASSWORD, Role::Customer)
        .await
        .unwrap();

    for _ in 0..5 {
        let err = service
            .login("pilot@example.com", "Wr0ngPass!", "127.0.0.1", "ua")
            .await
            .unwrap_err();
        assert_eq!(err, IamError::InvalidCredentials);
    }

    // Correct password on a locked account still fails, with the lockout
    // message.
    let locked = service
        .login("pilot@example.com", PASSWORD, "127.0.0.1", "ua")
        .await
        .unwrap_err();
    assert_eq!(locked, IamError::AccountLocked);
    assert_eq!(locked.to_string(), "account locked");

    // After the lockout window the correct password works and the counters
    // reset.
    clock.advance(Duration::minutes(16));
    let outcome = service
        .login("pilot@example.com", PASSWORD, "127.0.0.1", "ua")
        .await
        .unwrap();
    let user = service.get_user(outcome.user.id).await.unwrap();
    assert_eq!(user.login_attempts, 0);
    assert!(user.locked_until.is_none());
    assert!(user.last_login_at.is_some());
}

#[tokio::test]
async fn refresh_rotates_the_access_token() {
    let clock = clock();
    let service = service_with(&clock, AuthConfig::default());
    service
        .create_user("pilot@example.com", PASSWORD, Role::Customer)
        .await
        .unwrap();
    let outcome = service
        .login("pilot@example.com", PASSWORD, "127.0.0.1", "ua")
        .await
        .unwrap();

    // Past the access horizon, before the refresh horizon.
    clock.advance(Duration::minutes(20));
    let stale = service
        .validate_session(outcome.session_id, &outcome.tokens.access_token)
        .await
        .unwrap_err();
    assert_eq!(stale, IamError::SessionExpired);

    let (new_access, expires_at) = service
        .refresh(outcome.session_id, &outcome.tokens.refresh_token)
        .await
        .unwrap();
    assert!(expires_at > clock.now());

    // The new token validates; the old one no longer matches the session.
    service
        .validate_session(outcome.session_id, &new_access)
        .await
        .unwrap();
    let old = service
        .validate_session(outcome.session_id, &outcome.tokens.access_token)
        .await
        .unwrap_err();
    assert!(matches!(old, IamError::InvalidToken(_)));
}

#[tokio::test]
async fn refresh_rejects_a_mismatched_token() {
    let clock = clock();
    let service = service_with(&clock, AuthConfig::default());
    service
        .create_user("a@example.com", PASSWORD, Role::Customer)
        .await
        .unwrap();
    service
        .create_user("b@example.com", PASSWORD, Role::Customer)
        .await
        .unwrap();

    let first = service.login("a@example.com", PASSWORD, "ip", "ua").await.unwrap();
    let second = service.login("b@example.com", PASSWORD, "ip", "ua").await.unwrap();

    // One session's refresh token cannot refresh another session.
    let err = service
        .refresh(first.session_id, &second.tokens.refresh_token)
        .await
        .unwrap_err();
    assert_eq!(err, IamError::InvalidRefreshToken);
}

#[tokio::test]
async fn logout_revokes_and_blacklists() {
    let clock = clock();
    let service = service_with(&clock, AuthConfig::default());
    service
        .create_user("pilot@example.com", PASSWORD, Role::Customer)
        .await
        .unwrap();
    let outcome = service
        .login("pilot@example.com", PASSWORD, "127.0.0.1", "ua")
        .await
        .unwrap();

    service.logout(outcome.session_id).await.unwrap();

    let err = service
        .validate_session(outcome.session_id, &outcome.tokens.access_token)
        .await
        .unwrap_err();
    assert_eq!(err, IamError::SessionRevoked);

    let err = service
        .refresh(outcome.session_id, &outcome.tokens.refresh_token)
        .await
        .unwrap_err();
    assert_eq!(err, IamError::SessionRevoked);

    // A revoked session never becomes active again.
    let info = service.session_info(outcome.session_id).await.unwrap();
    assert!(info.status.is_terminal());
}

#[tokio::test]
async fn change_password_revokes_existing_sessions() {
    let clock = clock();
    let service = service_with(&clock, AuthConfig::default());
    let user = service
        .create_user("pilot@example.com", PASSWORD, Role::Customer)
        .await
        .unwrap();
    let outcome = service
        .login("pilot@example.com", PASSWORD, "127.0.0.1", "ua")
        .await
        .unwrap();

    service
        .change_password(user.id, PASSWORD, "N3wP@ssword!")
        .await
        .unwrap();

    let err = service
        .validate_session(outcome.session_id, &outcome.tokens.access_token)
        .await
        .unwrap_err();
    assert_eq!(err, IamError::SessionRevoked);

    service
        .login("pilot@example.com", "N3wP@ssword!", "127.0.0.1", "ua")
        .await
        .unwrap();
}

#[tokio::test]
async fn weak_passwords_are_rejected_at_creation_and_change() {
    let clock = clock();
    let service = service_with(&clock, AuthConfig::default());

    let err = service
        .create_user("pilot@example.com", "weak", Role::Customer)
        .await
        .unwrap_err();
    assert!(matches!(err, IamError::WeakPassword(_)));

    let user = service
        .create_user("pilot@example.com", PASSWORD, Role::Customer)
        .await
        .unwrap();
    let err = service
        .change_password(user.id, PASSWORD, "alllowercase1")
        .await
        .unwrap_err();
    assert!(matches!(err, IamError::WeakPassword(_)));
}

#[tokio::test]
async fn duplicate_email_is_a_conflict() {
    let clock = clock();
    let service = service_with(&clock, AuthConfig::default());
    service
        .create_user("pilot@example.com", PASSWORD, Role::Customer)
        .await
        .unwrap();
    let err = service
        .create_user("pilot@example.com", PASSWORD, Role::Customer)
        .await
        .unwrap_err();
    assert_eq!(err, IamError::DuplicateEmail);
}

#[tokio::test]
async fn deleted_users_cannot_log_in() {
    let clock = clock();
    let service = service_with(&clock, AuthConfig::default());
    let user = service
        .create_user("pilot@example.com", PASSWORD, Role::Customer)
        .await
        .unwrap();
    service.delete_user(user.id).await.unwrap();

    let err = service
        .login("pilot@example.com", PASSWORD, "127.0.0.1", "ua")
        .await
        .unwrap_err();
    assert_eq!(err, IamError::AccountDisabled);
}
