// src/config.rs

//! Configuration types for the gateway

// dependencies
use chrono::TimeDelta;
use ipnet::IpNet;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::errors::GatewayError;
use crate::throttle::ThrottleConfig;

pub const DEFAULT_PERSIST_FILE: &str = "granted_ips.json";
pub const DEFAULT_EXPIRATION_DAYS: u32 = 30;
pub const DEFAULT_BUCKET_RETENTION_DAYS: u32 = 7;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600;
pub const MAX_SWEEP_INTERVAL_SECS: u64 = 86_400;
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:9090";
pub const DEFAULT_UNLOCK_RATE: f64 = 5.0;
pub const DEFAULT_UNLOCK_BURST: f64 = 5.0;
pub const DEFAULT_MAX_FAILED_ATTEMPTS: usize = 20;

/// Configuration for gateway behavior
#[derive(Clone)]
pub struct GatewayConfig {
    pub(crate) secret: String,
    pub(crate) persist_file: PathBuf,
    pub(crate) expiration_days: u32,
    pub(crate) bucket_retention_days: u32,
    pub(crate) sweep_interval: Duration,
    pub(crate) allow_local_bypass: bool,
    pub(crate) trusted_proxies: Vec<IpNet>,
    pub(crate) listen_addr: SocketAddr,
    pub(crate) unlock_throttle: ThrottleConfig,
    pub(crate) max_failed_attempts: usize,
}

// never print the secret
impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("secret", &"[REDACTED]")
            .field("persist_file", &self.persist_file)
            .field("expiration_days", &self.expiration_days)
            .field("bucket_retention_days", &self.bucket_retention_days)
            .field("sweep_interval", &self.sweep_interval)
            .field("allow_local_bypass", &self.allow_local_bypass)
            .field("trusted_proxies", &self.trusted_proxies)
            .field("listen_addr", &self.listen_addr)
            .field("unlock_throttle", &self.unlock_throttle)
            .field("max_failed_attempts", &self.max_failed_attempts)
            .finish()
    }
}

impl GatewayConfig {
    /// Create a new configuration with the shared secret and defaults for everything else
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            persist_file: PathBuf::from(DEFAULT_PERSIST_FILE),
            expiration_days: DEFAULT_EXPIRATION_DAYS,
            bucket_retention_days: DEFAULT_BUCKET_RETENTION_DAYS,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            allow_local_bypass: false,
            trusted_proxies: Vec::new(),
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 9090)),
            unlock_throttle: ThrottleConfig::new(DEFAULT_UNLOCK_RATE, DEFAULT_UNLOCK_BURST),
            max_failed_attempts: DEFAULT_MAX_FAILED_ATTEMPTS,
        }
    }

    /// Read the configuration from the process environment
    pub fn from_env() -> Result<Self, GatewayError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`, which maps a variable name to its value.
    ///
    /// Numeric settings that fail to parse fall back to their default with a
    /// warning. The secret, the proxy list and the listen address are hard
    /// errors because there is no safe default for them.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, GatewayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = lookup("GATEWAY_PASSWORD").unwrap_or_default();
        let mut config = Self::new(secret);

        if let Some(path) = lookup("PERSIST_FILE").filter(|p| !p.is_empty()) {
            config.persist_file = PathBuf::from(path);
        }

        config.expiration_days =
            positive_or_default(&lookup, "IP_EXPIRATION_DAYS", DEFAULT_EXPIRATION_DAYS);
        config.bucket_retention_days = positive_or_default(
            &lookup,
            "BUCKET_RETENTION_DAYS",
            DEFAULT_BUCKET_RETENTION_DAYS,
        );
        config.sweep_interval = Duration::from_secs(positive_or_default(
            &lookup,
            "SWEEP_INTERVAL_SECS",
            DEFAULT_SWEEP_INTERVAL_SECS,
        ));
        config.max_failed_attempts = positive_or_default(
            &lookup,
            "MAX_FAILED_ATTEMPTS_PER_IP",
            DEFAULT_MAX_FAILED_ATTEMPTS,
        );

        config.allow_local_bypass = lookup("ALLOW_LOCAL_BYPASS").as_deref() == Some("true");

        if let Some(raw) = lookup("TRUSTED_PROXIES") {
            config.trusted_proxies = parse_trusted_proxies(&raw)?;
        }

        if let Some(raw) = lookup("LISTEN_ADDR").filter(|a| !a.is_empty()) {
            config.listen_addr = raw
                .parse()
                .map_err(|_| GatewayError::InvalidListenAddr(raw.clone()))?;
        }

        let rate = positive_or_default(&lookup, "UNLOCK_RATE_PER_SECOND", DEFAULT_UNLOCK_RATE);
        let burst = lookup("UNLOCK_BURST")
            .and_then(|raw| raw.trim().parse::<f64>().ok())
            .filter(|b| *b >= 0.0)
            .unwrap_or(DEFAULT_UNLOCK_BURST);
        config.unlock_throttle = ThrottleConfig::new(rate, burst);

        config.validate()?;
        Ok(config)
    }

    /// Builder-style: set the snapshot file path
    pub fn persist_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.persist_file = path.into();
        self
    }

    /// Builder-style: set the expiration age in days
    pub fn expiration_days(mut self, days: u32) -> Self {
        self.expiration_days = days;
        self
    }

    /// Builder-style: set the bucket retention in days
    pub fn bucket_retention_days(mut self, days: u32) -> Self {
        self.bucket_retention_days = days;
        self
    }

    /// Builder-style: set the sweep period
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Builder-style: enable or disable the local-network bypass
    pub fn allow_local_bypass(mut self, allow: bool) -> Self {
        self.allow_local_bypass = allow;
        self
    }

    /// Builder-style: set the trusted proxy networks
    pub fn trusted_proxies(mut self, proxies: Vec<IpNet>) -> Self {
        self.trusted_proxies = proxies;
        self
    }

    /// Builder-style: set the listen address
    pub fn listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = addr;
        self
    }

    /// Builder-style: set the unlock throttle
    pub fn unlock_throttle(mut self, throttle: ThrottleConfig) -> Self {
        self.unlock_throttle = throttle;
        self
    }

    /// Builder-style: set how many failed attempts are kept per IP
    pub fn max_failed_attempts(mut self, max: usize) -> Self {
        self.max_failed_attempts = max;
        self
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.persist_file
    }

    pub fn expiration(&self) -> TimeDelta {
        TimeDelta::days(i64::from(self.expiration_days))
    }

    pub fn bucket_retention(&self) -> TimeDelta {
        TimeDelta::days(i64::from(self.bucket_retention_days))
    }

    pub fn sweep_period(&self) -> Duration {
        self.sweep_interval
    }

    pub fn local_bypass_enabled(&self) -> bool {
        self.allow_local_bypass
    }

    pub fn proxies(&self) -> &[IpNet] {
        &self.trusted_proxies
    }

    pub fn addr(&self) -> SocketAddr {
        self.listen_addr
    }

    pub fn throttle(&self) -> &ThrottleConfig {
        &self.unlock_throttle
    }

    pub fn failed_attempt_cap(&self) -> usize {
        self.max_failed_attempts
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.secret.trim().is_empty() {
            return Err(GatewayError::MissingSecret);
        }
        if self.expiration_days == 0 {
            return Err(GatewayError::InvalidExpiration);
        }
        if self.bucket_retention_days == 0 {
            return Err(GatewayError::InvalidRetention);
        }
        if self.sweep_interval.is_zero()
            || self.sweep_interval > Duration::from_secs(MAX_SWEEP_INTERVAL_SECS)
        {
            return Err(GatewayError::InvalidSweepInterval);
        }
        self.unlock_throttle.validate()
    }
}

/// Parse a comma separated list of IPs or CIDR networks.
/// A bare address is taken as a single-host network.
pub fn parse_trusted_proxies(raw: &str) -> Result<Vec<IpNet>, GatewayError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse::<IpNet>()
                .or_else(|_| entry.parse::<IpAddr>().map(IpNet::from))
                .map_err(|_| GatewayError::InvalidTrustedProxy(entry.to_string()))
        })
        .collect()
}

fn positive_or_default<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + PartialOrd + Default + Copy + std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => value,
        _ => {
            warn!(
                key,
                value = %crate::sanitize::sanitize_for_log(&raw),
                default = %default,
                "invalid value, using default"
            );
            default
        }
    }
}
