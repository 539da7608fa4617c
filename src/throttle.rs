// src/throttle.rs

// unlock throttle: a Generic Cell Rate Algorithm (GCRA) limiter keyed by caller

// dependencies
use crate::clock::{Clock, SystemClock, to_nanos};
use crate::errors::{ClockError, GatewayError};
use dashmap::DashMap;
use std::hash::Hash;
use std::time::Duration;

const NANOS_PER_SECOND: f64 = 1_000_000_000.0;

// emission interval times (burst + 1) may not exceed one year
const MAX_WINDOW_NANOS: f64 = 365.0 * 86_400.0 * NANOS_PER_SECOND;

/// Rate and burst for a [`Throttle`].
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    pub(crate) rate_per_second: f64,
    pub(crate) burst_capacity: f64,
}

impl ThrottleConfig {
    /// Create a new configuration with rate and burst settings
    pub fn new(rate_per_second: f64, burst_capacity: f64) -> Self {
        Self {
            rate_per_second,
            burst_capacity,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), GatewayError> {
        if !(self.rate_per_second > 0.0 && self.rate_per_second <= NANOS_PER_SECOND) {
            return Err(GatewayError::InvalidRate);
        }
        let rate_nanos = NANOS_PER_SECOND / self.rate_per_second;
        if rate_nanos > MAX_WINDOW_NANOS {
            return Err(GatewayError::InvalidRate);
        }
        if !(self.burst_capacity >= 0.0)
            || rate_nanos * (self.burst_capacity + 1.0) > MAX_WINDOW_NANOS
        {
            return Err(GatewayError::InvalidBurst);
        }
        Ok(())
    }
}

/// Per-key GCRA limiter.
/// T identifies callers (the gateway uses the client IP string).
/// Each key stores only its theoretical arrival time (TAT) in nanoseconds.
#[derive(Debug)]
pub struct Throttle<T, C = SystemClock>
where
    T: Hash + Eq + Clone,
    C: Clock,
{
    rate_nanos: u64,
    tolerance_nanos: u64,
    state: DashMap<T, u64>,
    clock: C,
}

impl<T, C> Throttle<T, C>
where
    T: Hash + Eq + Clone,
    C: Clock,
{
    pub fn with_config(config: &ThrottleConfig, clock: C) -> Result<Self, GatewayError> {
        config.validate()?;
        let rate_nanos = (NANOS_PER_SECOND / config.rate_per_second) as u64;
        let tolerance_nanos = (config.burst_capacity * rate_nanos as f64) as u64;

        Ok(Self {
            rate_nanos,
            tolerance_nanos,
            state: DashMap::new(),
            clock,
        })
    }

    // requests per second
    pub fn rate(&self) -> f64 {
        NANOS_PER_SECOND / self.rate_nanos as f64
    }

    pub fn burst(&self) -> f64 {
        self.tolerance_nanos as f64 / self.rate_nanos as f64
    }

    pub fn tracked(&self) -> usize {
        self.state.len()
    }

    /// Decide whether `key` may proceed now.
    pub fn check(&self, key: T) -> Result<ThrottleDecision, ClockError> {
        let now = to_nanos(self.clock.now()?)?;

        // hold the entry for the whole decision so concurrent checks for one key serialize
        let mut entry = self.state.entry(key).or_insert(now);
        let previous_tat = *entry;

        if now >= previous_tat.saturating_sub(self.tolerance_nanos) {
            let new_tat = now.max(previous_tat).saturating_add(self.rate_nanos);
            *entry = new_tat;
            Ok(ThrottleDecision {
                allowed: true,
                retry_after: None,
            })
        } else {
            let wait = previous_tat
                .saturating_sub(self.tolerance_nanos)
                .saturating_sub(now);
            Ok(ThrottleDecision {
                allowed: false,
                retry_after: Some(Duration::from_nanos(wait)),
            })
        }
    }

    /// Forget keys whose allowance has been fully restored for longer than `max_stale`.
    pub fn cleanup_stale(&self, max_stale: Duration) -> Result<usize, ClockError> {
        let now = to_nanos(self.clock.now()?)?;
        let stale_nanos = u64::try_from(max_stale.as_nanos()).unwrap_or(u64::MAX);
        let cutoff = now.saturating_sub(stale_nanos);

        let before = self.state.len();
        self.state
            .retain(|_, tat| tat.saturating_add(self.tolerance_nanos) > cutoff);
        Ok(before.saturating_sub(self.state.len()))
    }
}

/// Outcome of a throttle check.
#[derive(Debug, Clone, PartialEq)]
pub struct ThrottleDecision {
    pub allowed: bool,
    /// How long until the caller may try again (when denied)
    pub retry_after: Option<Duration>,
}

impl ThrottleDecision {
    /// Whole seconds for a `Retry-After` header, rounded up.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after
            .map(|d| d.as_secs() + u64::from(d.subsec_nanos() > 0))
    }
}
