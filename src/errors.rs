// src/errors.rs

// error handling for the gateway

// dependencies
use std::path::PathBuf;
use thiserror::Error;

/// Failure reading the time.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ClockError {
    #[error("clock is unavailable")]
    Unavailable,
    #[error("time is outside the representable range")]
    OutOfRange,
}

/// Error type for gateway configuration, time and snapshot issues.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("GATEWAY_PASSWORD must be set to a non-empty value")]
    MissingSecret,
    #[error("expiration age must be at least one day")]
    InvalidExpiration,
    #[error("bucket retention must be at least one day")]
    InvalidRetention,
    #[error("sweep interval must be positive and at most one day")]
    InvalidSweepInterval,
    #[error("unlock rate must be between one per year and one per nanosecond")]
    InvalidRate,
    #[error("unlock burst must be non-negative and fit in a one year window")]
    InvalidBurst,
    #[error("invalid trusted proxy entry: {0}")]
    InvalidTrustedProxy(String),
    #[error("invalid listen address: {0}")]
    InvalidListenAddr(String),
    #[error("failed to install metrics recorder: {0}")]
    MetricsInit(String),
    #[error("clock error: {0}")]
    Clock(#[from] ClockError),
    #[error("snapshot I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot {path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[source] serde_json::Error),
}
