//! Process-level helpers shared by both binaries.

use tokio::signal;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `level` when set. Calling this twice
/// keeps the first subscriber.
pub fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    let result = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    if let Err(e) = result {
        eprintln!("tracing subscriber already installed: {e}");
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. This is a critical
/// initialization failure that should halt the application.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            panic!("Critical: cannot install Ctrl+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                panic!("Critical: cannot install SIGTERM signal handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => warn!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => warn!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
