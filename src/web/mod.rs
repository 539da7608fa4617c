// src/web/mod.rs

//! HTTP surface of the gateway.
//!
//! | Route | Purpose |
//! |---|---|
//! | `GET /unlock` | unlock form |
//! | `POST /unlock` | present the shared secret (throttled per IP) |
//! | `GET /access` | forward-auth check, 200 or 401 |
//! | `GET /audit` | granted IPs, failed logins, recent access checks |
//! | `GET /buckets?ip=` | hourly access counts for one IP |
//! | `GET /metrics` | Prometheus exposition, when a recorder is installed |

// private modules
mod client_ip;
mod handlers;
mod views;

// dependencies
use axum::Router;
use axum::routing::get;
use ipnet::IpNet;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::gate::Gate;
use crate::metrics::RecentAccesses;
use crate::throttle::Throttle;

pub use client_ip::{ClientIp, resolve_client_ip};

/// Shared state handed to every handler.
pub struct AppState<C = SystemClock>
where
    C: Clock,
{
    pub gate: Arc<Gate<C>>,
    pub throttle: Arc<Throttle<String, C>>,
    pub recent: Arc<RecentAccesses>,
    pub trusted_proxies: Arc<[IpNet]>,
    pub prometheus: Option<PrometheusHandle>,
}

// manual impl: derive would demand C: Clone
impl<C> Clone for AppState<C>
where
    C: Clock,
{
    fn clone(&self) -> Self {
        Self {
            gate: Arc::clone(&self.gate),
            throttle: Arc::clone(&self.throttle),
            recent: Arc::clone(&self.recent),
            trusted_proxies: Arc::clone(&self.trusted_proxies),
            prometheus: self.prometheus.clone(),
        }
    }
}

impl<C> AppState<C>
where
    C: Clock,
{
    pub fn new(gate: Arc<Gate<C>>, throttle: Arc<Throttle<String, C>>, trusted: Vec<IpNet>) -> Self {
        Self {
            gate,
            throttle,
            recent: Arc::new(RecentAccesses::default()),
            trusted_proxies: trusted.into(),
            prometheus: None,
        }
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }
}

/// Build the gateway router.
pub fn router<C>(state: AppState<C>) -> Router
where
    C: Clock + 'static,
{
    Router::new()
        .route(
            "/unlock",
            get(handlers::unlock_page).post(handlers::unlock_submit::<C>),
        )
        .route("/access", get(handlers::access::<C>))
        .route("/audit", get(handlers::audit::<C>))
        .route("/buckets", get(handlers::buckets::<C>))
        .route("/metrics", get(handlers::metrics_page::<C>))
        .with_state(state)
}
