// src/gate.rs

// authorization and access gates: the two ways callers reach the ledger

// dependencies
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::GatewayConfig;
use crate::errors::ClockError;
use crate::ledger::Ledger;
use crate::metrics;
use crate::sanitize::{sanitize_for_log, validate_secret};

/// IPs with failed attempts on record beyond this are not tracked until others go idle.
pub const MAX_TRACKED_FAILED_IPS: usize = 10_000;

/// Result of presenting a secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockOutcome {
    Granted,
    Rejected,
    /// The input was malformed and never compared.
    Invalid,
}

/// Result of an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Authorized,
    /// Not in the ledger, but admitted by the local-network bypass.
    LocalBypass,
    /// In the ledger, but past the expiration age. The sweeper removes it.
    Expired,
    Unknown,
}

impl AccessDecision {
    pub fn is_authorized(self) -> bool {
        matches!(self, Self::Authorized | Self::LocalBypass)
    }
}

/// One wrong secret, sanitized before storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedLogin {
    pub secret: String,
    pub at: DateTime<Utc>,
}

/// Front door to the ledger for unlock and access requests.
#[derive(Debug)]
pub struct Gate<C = SystemClock>
where
    C: Clock,
{
    ledger: Arc<Ledger<C>>,
    secret: String,
    allow_local_bypass: bool,
    failed: DashMap<String, VecDeque<FailedLogin>>,
    max_failed: usize,
}

impl<C> Gate<C>
where
    C: Clock,
{
    pub fn new(ledger: Arc<Ledger<C>>, config: &GatewayConfig) -> Self {
        Self {
            ledger,
            secret: config.secret().trim().to_string(),
            allow_local_bypass: config.local_bypass_enabled(),
            failed: DashMap::new(),
            max_failed: config.failed_attempt_cap(),
        }
    }

    pub fn ledger(&self) -> &Arc<Ledger<C>> {
        &self.ledger
    }

    /// Compare `presented` against the shared secret and grant `ip` on a match.
    pub fn unlock(&self, ip: &str, presented: &str) -> Result<UnlockOutcome, ClockError> {
        let Some(presented) = validate_secret(presented) else {
            warn!(ip = %sanitize_for_log(ip), "rejected malformed unlock input");
            return Ok(UnlockOutcome::Invalid);
        };

        let matched: bool = presented.as_bytes().ct_eq(self.secret.as_bytes()).into();
        metrics::unlock_attempt(matched);

        if matched {
            self.ledger.grant(ip)?;
            self.failed.remove(ip);
            info!(ip = %sanitize_for_log(ip), "correct secret presented");
            return Ok(UnlockOutcome::Granted);
        }

        let now = self.ledger.clock().now()?;
        let secret = sanitize_for_log(presented);
        warn!(ip = %sanitize_for_log(ip), attempt = %secret, "wrong secret presented");
        self.record_failure(ip, secret, now);
        Ok(UnlockOutcome::Rejected)
    }

    /// Decide whether `ip` may reach `host`, counting the access if so.
    pub fn check_access(&self, ip: &str, host: &str) -> Result<AccessDecision, ClockError> {
        if let Some(record) = self.ledger.lookup(ip) {
            let now = self.ledger.clock().now()?;
            if self.ledger.is_expired(&record, now) {
                info!(ip, authed_at = %record.authed_at(), "ip has expired");
                return Ok(AccessDecision::Expired);
            }
            self.ledger.record_access(&record, host)?;
            info!(ip, host = %sanitize_for_log(host), "access");
            return Ok(AccessDecision::Authorized);
        }

        if self.allow_local_bypass && is_local_bypass_ip(ip) {
            info!(ip, "local ip bypass enabled, adding to ledger");
            let record = self.ledger.grant(ip)?;
            self.ledger.record_access(&record, host)?;
            return Ok(AccessDecision::LocalBypass);
        }

        info!(ip, host = %sanitize_for_log(host), "rejecting access");
        Ok(AccessDecision::Unknown)
    }

    fn record_failure(&self, ip: &str, secret: String, at: DateTime<Utc>) {
        if self.max_failed == 0 {
            return;
        }
        if !self.failed.contains_key(ip) && self.failed.len() >= MAX_TRACKED_FAILED_IPS {
            warn!(ip = %sanitize_for_log(ip), "failed login table full, attempt not recorded");
            return;
        }
        let mut attempts = self.failed.entry(ip.to_string()).or_default();
        if attempts.len() == self.max_failed {
            attempts.pop_front();
        }
        attempts.push_back(FailedLogin { secret, at });
    }

    /// Forget IPs whose latest failed attempt is older than `max_idle`.
    /// Returns how many IPs were dropped.
    pub fn forget_idle_failures(&self, max_idle: TimeDelta) -> Result<usize, ClockError> {
        let now = self.ledger.clock().now()?;
        let Some(cutoff) = now.checked_sub_signed(max_idle) else {
            return Ok(0);
        };
        let before = self.failed.len();
        self.failed
            .retain(|_, attempts| attempts.back().is_some_and(|last| last.at >= cutoff));
        Ok(before.saturating_sub(self.failed.len()))
    }

    /// Failed attempts per IP, ordered by IP.
    pub fn failed_logins(&self) -> Vec<(String, Vec<FailedLogin>)> {
        let mut out: Vec<_> = self
            .failed
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().iter().cloned().collect()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

/// The local-network bypass range: 192.168.0.0 through 192.168.29.255.
pub fn is_local_bypass_ip(ip: &str) -> bool {
    match ip.parse::<IpAddr>().map(|addr| addr.to_canonical()) {
        Ok(IpAddr::V4(v4)) => {
            let [a, b, c, _] = v4.octets();
            a == 192 && b == 168 && c < 30
        }
        _ => false,
    }
}
