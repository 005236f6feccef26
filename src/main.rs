use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use order_pipeline::config::LogFormat;
use order_pipeline::log_client::IggyLogWriter;
use order_pipeline::{AppState, Config, build_router, metrics, utils};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::from_env();
    match &config {
        Ok(c) => utils::init_tracing(&c.log_level, c.log_format),
        Err(_) => utils::init_tracing("info", LogFormat::default()),
    }

    info!("Starting order API v{}", env!("CARGO_PKG_VERSION"));

    match run(config).await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

/// Run the API, returning an exit code on error.
async fn run(config: order_pipeline::AppResult<Config>) -> Result<(), exitcode::ExitCode> {
    let config = config.map_err(|e| {
        error!("Configuration error: {e}");
        exitcode::CONFIG
    })?;
    info!(
        host = %config.host,
        port = %config.port,
        brokers = ?config.brokers,
        stream = %config.stream,
        topic = %config.topic,
        strategy = %config.partition_strategy,
        "Configuration loaded"
    );

    if let Some(addr) = config.metrics_addr() {
        metrics::try_init_metrics(addr);
    }

    info!("Connecting log writer...");
    let writer = IggyLogWriter::connect(config.writer_config())
        .await
        .map_err(|e| {
            error!("Failed to connect log writer: {e}");
            exitcode::UNAVAILABLE
        })?;
    info!(partitions = writer.partitions(), "Log writer connected");

    let state = AppState::new(Arc::new(writer), config.clone());
    let app = build_router(state.clone());

    let addr: SocketAddr = config.server_addr().parse().map_err(|e| {
        error!("Invalid server address: {e}");
        exitcode::CONFIG
    })?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;

    info!("Server listening on http://{addr}");
    info!("API endpoints:");
    info!("  GET  /health        - Health check");
    info!("  GET  /ready         - Readiness check");
    info!("  POST /api/v1/order  - Create order");

    axum::serve(listener, app)
        .with_graceful_shutdown(utils::shutdown_signal())
        .await
        .map_err(|e| {
            error!("Server error: {e}");
            exitcode::SOFTWARE
        })?;

    info!("HTTP server stopped, closing log writer...");
    state.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}
