//! GraphJS server - forum, groups and profiles over a social graph
//!
//! Configuration comes from `GRAPHJS_*` environment variables; run with
//! `--help` to list them.

use anyhow::{Context, Result};
use axum::http::StatusCode;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info};

use graphjs::config::{self, ServerConfig};
use graphjs::handlers::{build_rate_limited_router, ServiceState};
use graphjs::{metrics, middleware, tracing_setup};

/// Upper bound on the snapshot flush at shutdown
const SHUTDOWN_FLUSH_TIMEOUT_SECS: u64 = 10;

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::args().any(|arg| arg == "--help" || arg == "-h") {
        config::print_env_help();
        return Ok(());
    }

    let server_config = ServerConfig::from_env();
    tracing_setup::init_tracing(server_config.json_logs);

    metrics::register_metrics().context("failed to register metrics")?;
    info!("Metrics registered at /metrics");

    info!("Starting GraphJS server...");
    server_config.log();

    let state = Arc::new(ServiceState::new(server_config.clone())?);
    let state_for_shutdown = Arc::clone(&state);

    // Rate limiting applies to API routes only; probes and metrics stay open
    let app = build_rate_limited_router(state)?;

    info!(
        "Concurrency limiting enabled: max_concurrent={}",
        server_config.max_concurrent_requests
    );

    let app = app
        .layer(axum::middleware::from_fn(middleware::track_metrics))
        .layer(ConcurrencyLimitLayer::new(
            server_config.max_concurrent_requests,
        ))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(server_config.request_timeout_secs),
        ))
        .layer(server_config.cors.to_layer())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind((server_config.host.as_str(), server_config.port))
        .await
        .with_context(|| {
            format!(
                "failed to bind {}:{}",
                server_config.host, server_config.port
            )
        })?;
    info!("Server listening on http://{}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Shutdown signal received, flushing graph...");

    let flush = tokio::task::spawn_blocking(move || state_for_shutdown.graph.flush());
    match tokio::time::timeout(Duration::from_secs(SHUTDOWN_FLUSH_TIMEOUT_SECS), flush).await {
        Ok(Ok(Ok(()))) => info!("Graph flushed successfully"),
        Ok(Ok(Err(e))) => error!("Failed to flush graph: {:#}", e),
        Ok(Err(e)) => error!("Flush task panicked: {}", e),
        Err(_) => {
            error!(
                "Graph flush timed out after {}s, forcing exit",
                SHUTDOWN_FLUSH_TIMEOUT_SECS
            );
            std::process::exit(1);
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Handle graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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

    info!("Shutdown signal received, starting graceful shutdown");
}
