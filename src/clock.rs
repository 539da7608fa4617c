// src/clock.rs

// clock module definition and implementations

// dependencies
use chrono::{DateTime, DurationRound, TimeDelta, Utc};

use crate::errors::ClockError;

/// Clock trait to abstract time retrieval.
/// Implementors must be thread-safe (Send + Sync).
/// The ledger, the sweeper and the unlock throttle all read time through this
/// trait, so tests can swap in a clock they control.
pub trait Clock: Send + Sync {
    fn now(&self) -> Result<DateTime<Utc>, ClockError>;
}

/// SystemClock implementation using the system time.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Result<DateTime<Utc>, ClockError> {
        Ok(Utc::now())
    }
}

/// Truncate an instant to the start of its UTC hour.
pub fn hour_floor(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(TimeDelta::hours(1)).unwrap_or(at)
}

/// Nanoseconds since the Unix epoch, as the throttle keeps them.
pub(crate) fn to_nanos(at: DateTime<Utc>) -> Result<u64, ClockError> {
    at.timestamp_nanos_opt()
        .and_then(|n| u64::try_from(n).ok())
        .ok_or(ClockError::OutOfRange)
}

#[cfg(any(test, feature = "testing"))]
pub use manual::ManualClock;

#[cfg(any(test, feature = "testing"))]
mod manual {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

    /// A clock that only moves when told to.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        nanos: Arc<AtomicI64>,
        should_fail: Arc<AtomicBool>,
    }

    impl ManualClock {
        pub fn new(start: DateTime<Utc>) -> Self {
            Self {
                nanos: Arc::new(AtomicI64::new(start.timestamp_nanos_opt().unwrap_or(0))),
                should_fail: Arc::new(AtomicBool::new(false)),
            }
        }

        pub fn advance(&self, by: TimeDelta) {
            let step = by.num_nanoseconds().unwrap_or(i64::MAX);
            self.nanos.fetch_add(step, Ordering::Relaxed);
        }

        pub fn set(&self, at: DateTime<Utc>) {
            self.nanos
                .store(at.timestamp_nanos_opt().unwrap_or(0), Ordering::Relaxed);
        }

        // Make the next call to `now()` return an error
        pub fn fail_next_call(&self) {
            self.should_fail.store(true, Ordering::Relaxed);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Result<DateTime<Utc>, ClockError> {
            if self.should_fail.swap(false, Ordering::Relaxed) {
                return Err(ClockError::Unavailable);
            }
            Ok(DateTime::from_timestamp_nanos(
                self.nanos.load(Ordering::Relaxed),
            ))
        }
    }
}
