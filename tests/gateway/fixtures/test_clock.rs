// tests/gateway/fixtures/test_clock.rs

// dependencies
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use ip_gate::{Clock, ClockError};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

// Test clock implementation
#[derive(Debug, Clone)]
pub struct TestClock {
    nanos: Arc<AtomicI64>,
}

impl TestClock {
    /// 2024-05-01T10:00:00Z, a fixed origin for every scenario
    pub fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    pub fn new() -> Self {
        Self::at(Self::t0())
    }

    pub fn at(start: DateTime<Utc>) -> Self {
        Self {
            nanos: Arc::new(AtomicI64::new(start.timestamp_nanos_opt().unwrap())),
        }
    }

    pub fn advance(&self, by: TimeDelta) {
        self.nanos
            .fetch_add(by.num_nanoseconds().unwrap(), Ordering::Relaxed);
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.nanos
            .store(at.timestamp_nanos_opt().unwrap(), Ordering::Relaxed);
    }
}

impl Clock for TestClock {
    fn now(&self) -> Result<DateTime<Utc>, ClockError> {
        Ok(DateTime::from_timestamp_nanos(
            self.nanos.load(Ordering::Relaxed),
        ))
    }
}
