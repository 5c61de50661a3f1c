//! netcheck
//!
//! Checks network connectivity between pods and services on all nodes.
//!
//! # Modes
//!
//! - `--once`: run one cycle, print the report and exit non-zero on failure.
//!   No HTTP server is started.
//! - continuous (default): serve `/metrics`, `/health` and `/ready`, run a
//!   cycle every interval until SIGINT/SIGTERM.

#![warn(clippy::pedantic)]

use netcheck::cluster::{install_crypto_provider, KubeConnector};
use netcheck::config::{Config, LogFormat};
use netcheck::observability::{
    health_router, init_metrics_recorder, metrics_router, HealthState, NoopMetricsSink,
    PrometheusMetricsSink,
};
use netcheck::tasks::{run_once, run_reconcile_loop};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "netcheck=info,tower_http=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    install_crypto_provider();

    // clap exits on --help and parse errors before tracing exists
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("netcheck: {e}");
            return ExitCode::from(2);
        }
    };

    init_tracing(config.log_format);
    info!(config = ?config, "Starting netcheck");

    let connector = KubeConnector::new(config.credentials.clone());

    if config.once {
        return match run_once(&connector, &config, &NoopMetricsSink).await {
            Ok(matrix) => {
                info!(issues = matrix.counters().issues, "Single check complete");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = %e, "Single check failed");
                ExitCode::FAILURE
            }
        };
    }

    match run_continuous(connector, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "netcheck failed");
            ExitCode::FAILURE
        }
    }
}

async fn run_continuous(
    connector: KubeConnector,
    config: Config,
) -> Result<(), Box<dyn std::error::Error>> {
    // Must happen before any metrics are recorded
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;
    info!("Prometheus metrics recorder initialized");

    let health_state = Arc::new(HealthState::new());
    let shutdown_token = CancellationToken::new();

    let app = health_router(Arc::clone(&health_state))
        .merge(metrics_router(prometheus_handle))
        .layer(tower_http::trace::TraceLayer::new_for_http());

    // Bind before spawning to fail fast on bind errors
    let addr = config.metrics_address;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!(error = %e, addr = %addr, "Failed to bind metrics server");
        format!("Failed to bind metrics server to {addr}: {e}")
    })?;
    info!(addr = %addr, "Metrics server bound");

    let server_token = shutdown_token.child_token();
    let server = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            server_token.cancelled().await;
            info!("Metrics server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Metrics server failed");
        }
    });

    let mut reconcile = tokio::spawn(run_reconcile_loop(
        Arc::new(connector),
        config,
        Arc::new(PrometheusMetricsSink),
        Arc::clone(&health_state),
        shutdown_token.child_token(),
    ));

    // The loop only returns on cancel, so finishing first means it died
    let early_exit = tokio::select! {
        () = shutdown_signal() => None,
        joined = &mut reconcile => Some(match joined {
            Ok(()) => "Reconcile loop exited unexpectedly".to_string(),
            Err(e) => format!("Reconcile task failed: {e}"),
        }),
    };

    health_state.set_not_ready();
    shutdown_token.cancel();

    if early_exit.is_none() {
        info!("Shutdown signal received, finishing current cycle");
        if let Err(e) = reconcile.await {
            error!(error = %e, "Reconcile task failed");
        }
    }

    if let Err(e) = server.await {
        error!(error = %e, "Metrics server task failed");
    }

    if let Some(reason) = early_exit {
        return Err(reason.into());
    }

    info!("netcheck shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
///
/// # Panics
///
/// Panics if signal handlers cannot be installed.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
