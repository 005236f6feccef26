use std::process::ExitCode;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use order_pipeline::config::LogFormat;
use order_pipeline::log_client::IggyLogReader;
use order_pipeline::{Config, LoggingProcessor, ProcessingLoop, metrics, utils};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::from_env();
    match &config {
        Ok(c) => utils::init_tracing(&c.log_level, c.log_format),
        Err(_) => utils::init_tracing("info", LogFormat::default()),
    }

    info!("Starting order worker v{}", env!("CARGO_PKG_VERSION"));

    match run(config).await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

async fn run(config: order_pipeline::AppResult<Config>) -> Result<(), exitcode::ExitCode> {
    let config = config.map_err(|e| {
        error!("Configuration error: {e}");
        exitcode::CONFIG
    })?;
    info!(
        brokers = ?config.brokers,
        group = %config.consumer_group,
        stream = %config.stream,
        topic = %config.topic,
        "Configuration loaded"
    );

    if let Some(addr) = config.worker_metrics_addr() {
        metrics::try_init_metrics(addr);
    }

    info!("Joining consumer group...");
    let reader = IggyLogReader::connect(config.reader_config())
        .await
        .map_err(|e| {
            error!("Failed to connect log reader: {e}");
            exitcode::UNAVAILABLE
        })?;

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        utils::shutdown_signal().await;
        signal_cancel.cancel();
    });

    let mut processing = ProcessingLoop::new(reader, LoggingProcessor, config.loop_options());
    processing.run(&cancel).await;

    let stats = processing.shutdown().await;
    info!(
        processed = stats.processed,
        skipped = stats.skipped,
        failed = stats.failed,
        "Worker shutdown complete"
    );
    Ok(())
}
