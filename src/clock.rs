//! Wall-clock capability
//!
//! The lifecycle manager never calls `Utc::now()` directly; it asks an injected
//! [`Clock`] so tests can run against virtual time.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Source of the current wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Time from now until `at`, or zero when `at` is already in the past
    fn until(&self, at: DateTime<Utc>) -> Duration {
        (at - self.now()).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Production clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    #[test]
    fn test_until_future_instant() {
        let now = Utc::now();
        let clock = FixedClock(now);
        assert_eq!(
            clock.until(now + chrono::Duration::seconds(90)),
            Duration::from_secs(90)
        );
    }

    #[test]
    fn test_until_past_instant_is_zero() {
        let now = Utc::now();
        let clock = FixedClock(now);
        assert_eq!(
            clock.until(now - chrono::Duration::seconds(5)),
            Duration::ZERO
        );
    }
}
