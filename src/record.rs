// src/record.rs

// per-IP authorization records and their hourly access buckets

// dependencies
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::clock::hour_floor;

/// Hour-aligned access counters, keyed by the start of the hour.
pub type Buckets = BTreeMap<DateTime<Utc>, u64>;

/// One IP address granted access.
///
/// `ip` and `authed_at` never change after creation. Everything that does
/// change lives behind the record's own lock, so accesses from different
/// IPs never contend with each other.
#[derive(Debug)]
pub struct AuthRecord {
    ip: String,
    authed_at: DateTime<Utc>,
    state: Mutex<RecordState>,
}

#[derive(Debug, Default)]
struct RecordState {
    last_access: Option<DateTime<Utc>>,
    domains: Vec<String>,
    buckets: Buckets,
}

impl AuthRecord {
    /// A fresh grant: no accesses, no domains, no buckets.
    pub fn new(ip: impl Into<String>, authed_at: DateTime<Utc>) -> Self {
        Self {
            ip: ip.into(),
            authed_at,
            state: Mutex::new(RecordState::default()),
        }
    }

    /// Rebuild a live record from its persisted form.
    pub fn from_snapshot(snapshot: RecordSnapshot) -> Self {
        Self {
            ip: snapshot.ip,
            authed_at: snapshot.authed_at,
            state: Mutex::new(RecordState {
                last_access: snapshot.last_access,
                domains: snapshot.domains_accessed,
                buckets: snapshot.buckets,
            }),
        }
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn authed_at(&self) -> DateTime<Utc> {
        self.authed_at
    }

    /// Time elapsed since the grant.
    pub fn age(&self, now: DateTime<Utc>) -> TimeDelta {
        now - self.authed_at
    }

    pub fn last_access(&self) -> Option<DateTime<Utc>> {
        self.state.lock().last_access
    }

    pub fn domains(&self) -> Vec<String> {
        self.state.lock().domains.clone()
    }

    pub fn buckets(&self) -> Buckets {
        self.state.lock().buckets.clone()
    }

    /// Count one access to `domain` at `at`.
    pub fn record_access(&self, domain: &str, at: DateTime<Utc>) {
        let mut state = self.state.lock();
        state.last_access = Some(at);

        // domain sets stay small, a linear scan is fine
        if !state.domains.iter().any(|d| d == domain) {
            state.domains.push(domain.to_string());
        }

        *state.buckets.entry(hour_floor(at)).or_insert(0) += 1;
    }

    /// Drop every bucket that started before `now - retention`.
    /// Returns how many buckets were removed.
    /// A retention reaching past the earliest representable instant keeps everything.
    pub fn prune_buckets(&self, retention: TimeDelta, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = now.checked_sub_signed(retention) else {
            return 0;
        };
        let mut state = self.state.lock();
        let before = state.buckets.len();
        state.buckets = state.buckets.split_off(&cutoff);
        before - state.buckets.len()
    }

    /// A consistent copy of this record, detached from the live one.
    pub fn snapshot(&self) -> RecordSnapshot {
        let state = self.state.lock();
        RecordSnapshot {
            ip: self.ip.clone(),
            authed_at: self.authed_at,
            last_access: state.last_access,
            domains_accessed: state.domains.clone(),
            buckets: state.buckets.clone(),
        }
    }
}

/// The persisted and read-only form of an [`AuthRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSnapshot {
    pub ip: String,
    #[serde(rename = "authed_time")]
    pub authed_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_access: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub domains_accessed: Vec<String>,
    #[serde(rename = "requests", default, deserialize_with = "null_as_default")]
    pub buckets: Buckets,
}

impl RecordSnapshot {
    /// Sum of every bucket.
    pub fn total_accesses(&self) -> u64 {
        self.buckets.values().sum()
    }
}

// older snapshots stored last_access as free-form text; anything that isn't
// RFC 3339 is read as "never accessed" rather than failing the whole file
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .filter(|s| !s.trim().is_empty())
        .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
        .map(|dt| dt.with_timezone(&Utc)))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
