// src/lib.rs

//! # IP Gate
//!
//! A network gate that trades a shared secret for time-limited access.
//! Callers who present the secret have their IP recorded in a [`Ledger`];
//! every later access check from that IP is counted into hourly buckets
//! until the grant expires.
//!
//! ## Quick Example
//!
//! ```rust
//! use std::sync::Arc;
//! use ip_gate::{Gate, GatewayConfig, Ledger, SystemClock};
//!
//! let config = GatewayConfig::new("open sesame");
//! let ledger = Arc::new(Ledger::with_config(&config, SystemClock));
//! let gate = Gate::new(Arc::clone(&ledger), &config);
//!
//! gate.unlock("10.0.0.1", "open sesame").unwrap();
//! let decision = gate.check_access("10.0.0.1", "wiki.example").unwrap();
//! assert!(decision.is_authorized());
//! assert_eq!(ledger.lookup("10.0.0.1").unwrap().domains(), vec!["wiki.example"]);
//! ```

// private modules
mod clock;
mod config;
mod errors;
mod gate;
mod ledger;
mod persist;
mod record;
mod sweeper;
mod throttle;

// public modules
pub mod metrics;
pub mod sanitize;
pub mod web;

// public API exports
pub use clock::{Clock, SystemClock, hour_floor};
#[cfg(any(test, feature = "testing"))]
pub use clock::ManualClock;
pub use config::{GatewayConfig, parse_trusted_proxies};
pub use errors::{ClockError, GatewayError};
pub use gate::{AccessDecision, FailedLogin, Gate, UnlockOutcome, is_local_bypass_ip};
pub use ledger::Ledger;
pub use persist::SnapshotFile;
pub use record::{AuthRecord, Buckets, RecordSnapshot};
pub use sweeper::{SweepReport, Sweeper};
pub use throttle::{Throttle, ThrottleConfig, ThrottleDecision};
