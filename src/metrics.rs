// src/metrics.rs

//! Gateway counters and the recent-access log.
//!
//! Counters go through the `metrics` facade, so they are free when no
//! recorder is installed. The binary installs a Prometheus recorder and
//! serves it on `/metrics`.

// dependencies
use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::errors::GatewayError;

pub const ACCESS_PAGE_VISITS: &str = "gateway_access_page_visits_total";
pub const ACCESS_REQUESTS: &str = "gateway_access_requests_total";
pub const WRONG_PASSWORD: &str = "gateway_wrong_password_attempts_total";
pub const CORRECT_PASSWORD: &str = "gateway_correct_password_attempts_total";
pub const GRANTED_IPS: &str = "gateway_granted_ips";

/// How many access requests the recent-access log keeps.
pub const RECENT_ACCESS_CAPACITY: usize = 1000;

/// Install the Prometheus recorder and register metric descriptions.
pub fn install_prometheus() -> Result<PrometheusHandle, GatewayError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| GatewayError::MetricsInit(e.to_string()))?;
    describe();
    Ok(handle)
}

fn describe() {
    describe_counter!(
        ACCESS_PAGE_VISITS,
        "The total number of visits to the access page"
    );
    describe_counter!(
        ACCESS_REQUESTS,
        "The total number of access requests with details"
    );
    describe_counter!(WRONG_PASSWORD, "The total number of wrong password attempts");
    describe_counter!(
        CORRECT_PASSWORD,
        "The total number of correct password attempts"
    );
    describe_gauge!(GRANTED_IPS, "The number of IPs currently in the ledger");
}

pub(crate) fn access_checked() {
    counter!(ACCESS_PAGE_VISITS).increment(1);
    counter!(ACCESS_REQUESTS).increment(1);
}

pub(crate) fn unlock_attempt(matched: bool) {
    if matched {
        counter!(CORRECT_PASSWORD).increment(1);
    } else {
        counter!(WRONG_PASSWORD).increment(1);
    }
}

pub(crate) fn set_granted(count: usize) {
    gauge!(GRANTED_IPS).set(count as f64);
}

/// One access-check request as seen by the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRequest {
    pub ip: String,
    pub at: DateTime<Utc>,
    pub user_agent: String,
    pub host: String,
    pub method: String,
}

/// Bounded log of the most recent access-check requests.
#[derive(Debug)]
pub struct RecentAccesses {
    capacity: usize,
    entries: Mutex<VecDeque<AccessRequest>>,
}

impl Default for RecentAccesses {
    fn default() -> Self {
        Self::with_capacity(RECENT_ACCESS_CAPACITY)
    }
}

impl RecentAccesses {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(RECENT_ACCESS_CAPACITY))),
        }
    }

    pub fn push(&self, request: AccessRequest) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(request);
    }

    /// Oldest first.
    pub fn snapshot(&self) -> Vec<AccessRequest> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
