//! icongate Server Entry Point
//!
//! Loads configuration, warms up the upstream session, starts the
//! background jobs and serves the API until Ctrl-C or SIGTERM.

use axum::Router;
use icongate_api::telemetry::init_tracing;
use icongate_api::{create_api_router, ApiConfig, ApiError, ApiResult, AppState, BackgroundJobs};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    let config = ApiConfig::from_env();
    init_tracing(config.log_format)?;

    config
        .validate()
        .map_err(|e| ApiError::internal_error(format!("Invalid configuration: {}", e)))?;
    let addr = config
        .bind_addr()
        .map_err(|e| ApiError::internal_error(format!("Invalid bind address: {}", e)))?;

    tracing::info!(
        max_concurrent = config.max_concurrent,
        max_cache_size = config.max_cache_size,
        cache_ttl_secs = config.cache_ttl.as_secs(),
        memory_ceiling = %config.memory_ceiling,
        upstream = %config.upstream_base_url,
        "Configuration loaded"
    );

    let state = AppState::from_config(config);
    state.init().await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let jobs = BackgroundJobs::spawn(&state, shutdown_rx);

    let app: Router = create_api_router(state.clone());

    tracing::info!(%addr, "Starting icongate server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)));

    let _ = shutdown_tx.send(true);
    jobs.join().await;
    state.shutdown().await;

    served
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
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
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutdown signal received");
}
