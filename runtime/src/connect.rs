//! Connect-with-backoff for external dependencies.
//!
//! Every external connection (broker, Redis, Postgres, IAM channel) goes
//! through the same exponential backoff: base 2 s, doubling, capped at 60 s,
//! up to 10 attempts. A dependency that cannot be reached within that budget
//! is a fatal startup error.

use std::time::Duration;
use tokio::time::sleep;

/// Backoff policy for dependency connections.
#[derive(Debug, Clone)]
pub struct ConnectPolicy {
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Cap for the exponential delay.
    pub max_delay: Duration,
    /// Delay multiplier per attempt.
    pub multiplier: f64,
    /// Total attempts, counting the first.
    pub max_attempts: u32,
}

impl Default for ConnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            max_attempts: 10,
        }
    }
}

impl ConnectPolicy {
    /// Delay before attempt `attempt` (1-based; attempt 1 has no delay).
    #[must_use]
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let millis = (self.base_delay.as_millis() as f64
            * self.multiplier.powi(attempt.saturating_sub(2) as i32)) as u64;
        Duration::from_millis(millis).min(self.max_delay)
    }
}

/// Attempt `connect` until it succeeds or the policy is exhausted.
///
/// # Errors
///
/// Returns the final connection error once every attempt has failed.
pub async fn connect_with_backoff<F, Fut, T, E>(
    dependency: &str,
    policy: &ConnectPolicy,
    mut connect: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let delay = policy.delay_before(attempt);
        if !delay.is_zero() {
            sleep(delay).await;
        }

        match connect().await {
            Ok(connection) => {
                tracing::info!(dependency, attempt, "dependency connected");
                return Ok(connection);
            }
            Err(error) => {
                if attempt >= policy.max_attempts {
                    tracing::error!(
                        dependency,
                        attempt,
                        error = %error,
                        "dependency unreachable, giving up"
                    );
                    return Err(error);
                }
                tracing::warn!(
                    dependency,
                    attempt,
                    next_delay_ms = policy.delay_before(attempt + 1).as_millis() as u64,
                    error = %error,
                    "dependency connection failed, will retry"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_schedule_doubles_and_caps() {
        let policy = ConnectPolicy::default();
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_secs(2));
        assert_eq!(policy.delay_before(3), Duration::from_secs(4));
        assert_eq!(policy.delay_before(4), Duration::from_secs(8));
        assert_eq!(policy.delay_before(7), Duration::from_secs(60));
        assert_eq!(policy.delay_before(10), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let policy = ConnectPolicy {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
            max_attempts: 5,
        };
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = Arc::clone(&attempts);

        let result = connect_with_backoff("redis", &policy, move || {
            let attempts = Arc::clone(&attempts_clone);
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("connection refused")
                } else {
                    Ok("connected")
                }
            }
        })
        .await;

        assert_eq!(result, Ok("connected"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_returns_final_error() {
        let policy = ConnectPolicy {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            multiplier: 2.0,
            max_attempts: 3,
        };
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = Arc::clone(&attempts);

        let result: Result<(), _> = connect_with_backoff("postgres", &policy, move || {
            let attempts = Arc::clone(&attempts_clone);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err("still refused")
            }
        })
        .await;

        assert_eq!(result, Err("still refused"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
