//! Ambient capabilities injected at construction.
//!
//! Services receive their clocks (and other ambient facilities) as explicit
//! values so tests can substitute deterministic implementations.

use chrono::{DateTime, Utc};

/// A source of the current UTC time.
///
/// Production code uses [`SystemClock`]; tests use the fixed clock from the
/// testing crate.
pub trait Clock: Send + Sync {
    /// The current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// The real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn system_clock_advances() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
