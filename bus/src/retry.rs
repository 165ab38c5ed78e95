//! The consumer retry ladder.
//!
//! A fixed-backoff ladder with an error-kind predicate: transient failures
//! climb the ladder, validation-class failures abort on the first rung.

use rocketry_core::FabricError;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry ladder configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts after the initial one.
    pub max_attempts: u32,
    /// Fixed wait between attempts.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// A ladder with `max_attempts` rungs and a fixed `backoff`.
    #[must_use]
    pub const fn fixed(max_attempts: u32, backoff: Duration) -> Self {
        Self { max_attempts, backoff }
    }

    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self { max_attempts: 0, backoff: Duration::ZERO }
    }
}

/// Outcome of a laddered execution.
#[derive(Debug)]
pub enum LadderOutcome<T> {
    /// The operation succeeded, possibly after retries.
    Success {
        /// The operation's value.
        value: T,
        /// Attempts consumed, counting the first.
        attempts: u32,
    },
    /// The ladder was exhausted or aborted by a non-retryable error.
    Failed {
        /// The final error.
        error: FabricError,
        /// Attempts consumed, counting the first.
        attempts: u32,
    },
}

/// Run `operation` through the ladder.
///
/// Retries only errors whose kind is retryable; a validation-class error
/// skips the remaining rungs.
pub async fn run_ladder<F, Fut, T>(policy: &RetryPolicy, mut operation: F) -> LadderOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FabricError>>,
{
    let mut attempts: u32 = 0;
    loop {
        attempts += 1;
        match operation().await {
            Ok(value) => {
                if attempts > 1 {
                    debug!(attempts, "handler succeeded after retry");
                }
                return LadderOutcome::Success { value, attempts };
            }
            Err(error) => {
                let exhausted = attempts > policy.max_attempts;
                if exhausted || !error.is_retryable() {
                    warn!(
                        attempts,
                        error = %error,
                        kind = error.kind().as_str(),
                        retryable = error.is_retryable(),
                        "handler failed permanently"
                    );
                    return LadderOutcome::Failed { error, attempts };
                }
                warn!(
                    attempt = attempts,
                    backoff_ms = policy.backoff.as_millis() as u64,
                    error = %error,
                    "handler failed, retrying"
                );
                tokio::time::sleep(policy.backoff).await;
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

    #[tokio::test]
    async fn transient_errors_climb_the_ladder() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(1));
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let outcome = run_ladder(&policy, move || {
            let calls = Arc::clone(&calls_clone);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(FabricError::Transient("broker blip".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        match outcome {
            LadderOutcome::Success { value, attempts } => {
                assert_eq!(value, 42);
                assert_eq!(attempts, 3);
            }
            LadderOutcome::Failed { .. } => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn validation_errors_skip_the_ladder() {
        let policy = RetryPolicy::fixed(5, Duration::from_millis(1));
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let outcome = run_ladder::<_, _, ()>(&policy, move || {
            let calls = Arc::clone(&calls_clone);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FabricError::Validation("malformed payload".into()))
            }
        })
        .await;

        assert!(matches!(outcome, LadderOutcome::Failed { attempts: 1, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ladder_exhaustion_reports_final_error() {
        let policy = RetryPolicy::fixed(2, Duration::from_millis(1));
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let outcome = run_ladder::<_, _, ()>(&policy, move || {
            let calls = Arc::clone(&calls_clone);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FabricError::Transient("still down".into()))
            }
        })
        .await;

        match outcome {
            LadderOutcome::Failed { error, attempts } => {
                assert_eq!(attempts, 3); // initial + 2 retries
                assert!(error.is_retryable());
            }
            LadderOutcome::Success { .. } => panic!("expected failure"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
