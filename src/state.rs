//! Shared application state for Axum handlers.
//!
//! The log writer is built once at startup and injected here; handlers only
//! see it through [`OrderService`] and the connection flag.
//!
//! # Background Tasks
//!
//! A health check task pings the broker through the writer every
//! `health_check_interval`. A ping refreshes the writer's connection state,
//! so `/ready` recovers once the broker answers again even when no order
//! is published. The task is tracked by a [`TaskTracker`] and stopped by
//! [`AppState::shutdown`].

use std::sync::Arc;
use std::time::Instant;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::log_client::LogWriter;
use crate::services::OrderService;

/// Shared application state for Axum handlers.
///
/// Cloned for each request; everything inside is behind `Arc` or is a
/// cheaply cloneable handle.
///
/// # Lifecycle
///
/// ```rust,ignore
/// let state = AppState::new(writer, config);  // spawns the health check
/// // ... serve requests ...
/// state.shutdown().await;  // stop background tasks, then close the writer
/// ```
#[derive(Clone)]
pub struct AppState {
    /// Ingestion service publishing order commands
    pub orders: OrderService,
    /// Writer shared with `orders`, kept for health and shutdown
    pub writer: Arc<dyn LogWriter>,
    /// Application configuration
    pub config: Arc<Config>,
    /// Timestamp when the application started
    pub started_at: Instant,
    /// Tracks spawned background tasks
    task_tracker: TaskTracker,
    /// Signals background tasks to stop
    cancellation_token: CancellationToken,
}

impl AppState {
    /// Create the state and spawn its background tasks.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(writer: Arc<dyn LogWriter>, config: Config) -> Self {
        let orders = OrderService::new(Arc::clone(&writer), config.publish_timeout);

        let state = Self {
            orders,
            writer,
            config: Arc::new(config),
            started_at: Instant::now(),
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        };

        state.spawn_health_check_task();

        state
    }

    /// Spawn the task that pings the broker on every health check tick.
    fn spawn_health_check_task(&self) {
        let writer = Arc::clone(&self.writer);
        let interval_duration = self.config.health_check_interval;
        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn(async move {
            let mut ticker = interval(interval_duration);
            ticker.tick().await; // Skip first immediate tick

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Health check task received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        match writer.ping().await {
                            Ok(()) => trace!("Health check: log broker reachable"),
                            Err(e) => warn!(error = %e, "Health check: log broker unreachable"),
                        }
                    }
                }
            }

            debug!("Health check task shutting down");
        });
    }

    /// Get uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Whether the writer holds a live broker connection.
    pub fn log_connected(&self) -> bool {
        self.writer.is_connected()
    }

    /// Stop background tasks, then close the writer, waiting for in-flight
    /// publishes to finish.
    pub async fn shutdown(&self) {
        info!("Stopping background tasks...");
        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("Closing log writer...");
        match self.writer.close().await {
            Ok(()) => info!(
                orders_accepted = self.orders.orders_accepted(),
                "Log writer closed"
            ),
            Err(e) => warn!(error = %e, "Failed to close log writer"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::error::PublishError;
    use crate::log_client::{MemoryLog, PartitionStrategy};

    fn state(log: &MemoryLog, health_check_interval: Duration) -> AppState {
        let config = Config {
            health_check_interval,
            ..Config::default()
        };
        AppState::new(Arc::new(log.writer(PartitionStrategy::LeastBytes)), config)
    }

    #[tokio::test]
    async fn test_shutdown_closes_writer() {
        let log = MemoryLog::new(1);
        let state = state(&log, Duration::from_secs(30));
        assert!(state.log_connected());

        state.shutdown().await;
        state.shutdown().await;

        assert!(!state.log_connected());
        assert!(state.task_tracker.is_empty());
    }

    #[tokio::test]
    async fn test_uptime_starts_near_zero() {
        let log = MemoryLog::new(1);
        let state = state(&log, Duration::from_secs(30));

        assert!(state.uptime_seconds() < 5);
        state.shutdown().await;
    }

    #[tokio::test]
    async fn test_health_check_reconnects_after_failed_publish() {
        let log = MemoryLog::new(1);
        let state = state(&log, Duration::from_millis(10));

        log.fail_next_publish(PublishError::Unavailable("broker down".to_string()));
        let result = state
            .writer
            .publish(Bytes::from_static(b"k"), Bytes::from_static(b"v"), Duration::from_secs(1))
            .await;
        assert!(result.is_err());
        assert!(!state.log_connected());

        tokio::time::timeout(Duration::from_secs(2), async {
            while !state.log_connected() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("health check should restore the connection");

        state.shutdown().await;
    }

    #[tokio::test]
    async fn test_health_check_stays_down_while_pings_fail() {
        let log = MemoryLog::new(1);
        for _ in 0..100 {
            log.fail_next_ping(PublishError::Unavailable("broker down".to_string()));
        }
        let state = state(&log, Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!state.log_connected());

        state.shutdown().await;
    }
}
