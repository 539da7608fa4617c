// src/main.rs

// gateway binary: config from the environment, ledger from disk, serve

// dependencies
use anyhow::Context;
use chrono::TimeDelta;
use ip_gate::web::{self, AppState};
use ip_gate::{
    GatewayConfig, Gate, Ledger, SnapshotFile, Sweeper, SystemClock, Throttle, metrics,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

// throttle state idle this long carries no information
const THROTTLE_STALE_AFTER: Duration = Duration::from_secs(3600);
// failed logins are kept for a day after an IP's last attempt
const FAILED_LOGIN_IDLE_HOURS: i64 = 24;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;

    let config = GatewayConfig::from_env().context("invalid configuration")?;
    info!(?config, "starting gateway");

    let ledger = Arc::new(Ledger::with_config(&config, SystemClock));
    let store = SnapshotFile::new(config.snapshot_path());
    let admitted = ledger
        .restore(store.load())
        .context("clock unavailable while loading snapshot")?;
    info!(admitted, path = %store.path().display(), "loaded ip(s) from snapshot");

    let gate = Arc::new(Gate::new(Arc::clone(&ledger), &config));
    let failed_logins = Arc::clone(&gate);
    let throttle = Arc::new(
        Throttle::with_config(config.throttle(), SystemClock).context("invalid unlock throttle")?,
    );

    let mut state = AppState::new(gate, Arc::clone(&throttle), config.proxies().to_vec());
    match metrics::install_prometheus() {
        Ok(handle) => state = state.with_prometheus(handle),
        Err(e) => warn!(error = %e, "metrics disabled"),
    }

    let shutdown = CancellationToken::new();
    let sweeper = Sweeper::new(Arc::clone(&ledger), store, config.sweep_period()).spawn(shutdown.clone());
    spawn_idle_cleanup(throttle, failed_logins, config.sweep_period(), shutdown.clone());

    let listener = TcpListener::bind(config.addr())
        .await
        .with_context(|| format!("failed to bind {}", config.addr()))?;
    info!(addr = %config.addr(), "listening");

    let app = web::router(state).into_make_service_with_connect_info::<SocketAddr>();
    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            server_shutdown.cancel();
        })
        .await
        .context("server error")?;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        error!(error = %e, "sweeper task panicked");
    }
    info!("gateway stopped");
    Ok(())
}

fn init_logging() -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ip_gate=info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        registry
            .with(fmt::layer().json().with_target(true))
            .try_init()
            .context("failed to initialize logging")?;
    } else {
        registry
            .with(fmt::layer().with_target(true))
            .try_init()
            .context("failed to initialize logging")?;
    }
    Ok(())
}

fn spawn_idle_cleanup(
    throttle: Arc<Throttle<String, SystemClock>>,
    gate: Arc<Gate<SystemClock>>,
    period: Duration,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match throttle.cleanup_stale(THROTTLE_STALE_AFTER) {
                        Ok(removed) if removed > 0 => info!(removed, "forgot idle unlock throttle entries"),
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "throttle cleanup failed"),
                    }
                    match gate.forget_idle_failures(TimeDelta::hours(FAILED_LOGIN_IDLE_HOURS)) {
                        Ok(removed) if removed > 0 => info!(removed, "forgot idle failed login entries"),
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "failed login cleanup failed"),
                    }
                }
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
