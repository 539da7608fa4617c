// src/ledger.rs

// the authorization ledger: which IPs are granted, and since when

// dependencies
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::config::GatewayConfig;
use crate::errors::ClockError;
use crate::metrics;
use crate::record::{AuthRecord, RecordSnapshot};

/// The in-memory set of authorized IPs.
/// C is the clock type, defaulting to SystemClock.
/// Membership lives in a `DashMap` keyed by IP, so there is at most one record
/// per address; each record carries its own lock for access updates.
#[derive(Debug)]
pub struct Ledger<C = SystemClock>
where
    C: Clock,
{
    records: DashMap<String, Arc<AuthRecord>>,
    expiration: TimeDelta,
    bucket_retention: TimeDelta,
    dirty: AtomicBool,
    clock: C,
}

impl<C> Ledger<C>
where
    C: Clock,
{
    pub fn new(expiration: TimeDelta, bucket_retention: TimeDelta, clock: C) -> Self {
        Self {
            records: DashMap::new(),
            expiration,
            bucket_retention,
            dirty: AtomicBool::new(false),
            clock,
        }
    }

    pub fn with_config(config: &GatewayConfig, clock: C) -> Self {
        Self::new(config.expiration(), config.bucket_retention(), clock)
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn expiration(&self) -> TimeDelta {
        self.expiration
    }

    pub fn bucket_retention(&self) -> TimeDelta {
        self.bucket_retention
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether a record is past the expiration age at `now`.
    pub fn is_expired(&self, record: &AuthRecord, now: DateTime<Utc>) -> bool {
        record.age(now) > self.expiration
    }

    /// Grant `ip` access.
    ///
    /// Granting an IP that already holds a live record returns that record
    /// untouched. An expired record for the same IP is replaced by a fresh one.
    /// Persistence happens on the next sweep.
    pub fn grant(&self, ip: &str) -> Result<Arc<AuthRecord>, ClockError> {
        let now = self.clock.now()?;
        let record = match self.records.entry(ip.to_string()) {
            Entry::Occupied(mut entry) => {
                if !self.is_expired(entry.get(), now) {
                    debug!(ip, "grant for already authorized ip is a no-op");
                    return Ok(Arc::clone(entry.get()));
                }
                let fresh = Arc::new(AuthRecord::new(ip, now));
                entry.insert(Arc::clone(&fresh));
                fresh
            }
            Entry::Vacant(entry) => {
                let fresh = Arc::new(AuthRecord::new(ip, now));
                entry.insert(Arc::clone(&fresh));
                fresh
            }
        };

        self.dirty.store(true, Ordering::Release);
        metrics::set_granted(self.records.len());
        info!(ip, authed_at = %now, "granted access");
        Ok(record)
    }

    /// The live record for `ip`, if any. Expired records are still returned;
    /// callers decide what expiry means for them.
    pub fn lookup(&self, ip: &str) -> Option<Arc<AuthRecord>> {
        self.records.get(ip).map(|entry| Arc::clone(entry.value()))
    }

    /// Record one access by `record` to `domain`, stamped with the ledger's clock.
    pub fn record_access(&self, record: &AuthRecord, domain: &str) -> Result<(), ClockError> {
        let now = self.clock.now()?;
        record.record_access(domain, now);
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    /// A point-in-time copy of every record, ordered by grant time then IP.
    pub fn snapshot(&self) -> Vec<RecordSnapshot> {
        // collect the Arcs first so no shard lock is held while records lock
        let live: Vec<Arc<AuthRecord>> = self
            .records
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut out: Vec<RecordSnapshot> = live.iter().map(|r| r.snapshot()).collect();
        out.sort_by(|a, b| a.authed_at.cmp(&b.authed_at).then_with(|| a.ip.cmp(&b.ip)));
        out
    }

    /// Evict every record older than the expiration age at `now`.
    /// Returns the number of records removed.
    pub fn remove_expired(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        self.records.retain(|ip, record| {
            if record.age(now) > self.expiration {
                info!(ip = %ip, authed_at = %record.authed_at(), "removing expired ip");
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            self.dirty.store(true, Ordering::Release);
            metrics::set_granted(self.records.len());
        }
        removed
    }

    /// Prune old buckets on every live record. Returns the total pruned.
    pub fn prune_buckets(&self, now: DateTime<Utc>) -> usize {
        let live: Vec<Arc<AuthRecord>> = self
            .records
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        live.iter()
            .map(|record| record.prune_buckets(self.bucket_retention, now))
            .sum()
    }

    /// Admit persisted records, skipping those already expired.
    /// Returns how many were admitted.
    pub fn restore(&self, snapshots: Vec<RecordSnapshot>) -> Result<usize, ClockError> {
        let now = self.clock.now()?;
        let mut admitted = 0;

        for snapshot in snapshots {
            if now - snapshot.authed_at > self.expiration {
                info!(ip = %snapshot.ip, authed_at = %snapshot.authed_at, "skipping expired ip");
                continue;
            }
            debug!(ip = %snapshot.ip, authed_at = %snapshot.authed_at, "restored ip");
            let record = Arc::new(AuthRecord::from_snapshot(snapshot));
            self.records.insert(record.ip().to_string(), record);
            admitted += 1;
        }

        metrics::set_granted(self.records.len());
        Ok(admitted)
    }

    /// Clear the dirty flag, reporting whether it was set.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    /// Put the dirty flag back after a failed save.
    pub(crate) fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }
}
