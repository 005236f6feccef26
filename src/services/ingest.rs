use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::codec;
use crate::error::{AppError, AppResult, sanitize_serde_error};
use crate::log_client::LogWriter;
use crate::metrics;
use crate::models::{CreateOrderRequest, OrderCommand};

/// Hands out strictly increasing UTC timestamps with microsecond precision.
///
/// Two commands created by the same service never share a `created_at`,
/// even when the wall clock stalls or steps backwards.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last_micros: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> DateTime<Utc> {
        let wall = Utc::now().timestamp_micros();
        let next = |last: i64| wall.max(last.saturating_add(1));

        let previous = self
            .last_micros
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(next(last)))
            .unwrap_or_else(|last| last);

        DateTime::from_timestamp_micros(next(previous)).unwrap_or_else(Utc::now)
    }
}

/// Turns order requests into commands on the log.
///
/// One instance is built at startup around the shared writer and cloned
/// into every request. Publishing is attempted exactly once per request;
/// the HTTP caller decides whether to retry.
///
/// # Counter Memory Ordering
///
/// `orders_accepted` uses `Ordering::Relaxed`: it only feeds the health
/// endpoint and nothing synchronizes on it.
#[derive(Clone)]
pub struct OrderService {
    writer: Arc<dyn LogWriter>,
    publish_timeout: Duration,
    clock: Arc<MonotonicClock>,
    orders_accepted: Arc<AtomicU64>,
}

impl OrderService {
    pub fn new(writer: Arc<dyn LogWriter>, publish_timeout: Duration) -> Self {
        Self {
            writer,
            publish_timeout,
            clock: Arc::new(MonotonicClock::new()),
            orders_accepted: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Parse a raw request body and submit the order.
    ///
    /// # Errors
    ///
    /// - `AppError::BadRequest` when the body is not a valid order request;
    ///   nothing is published in that case
    /// - `AppError::Processing` when encoding or publishing fails
    #[instrument(skip_all, fields(body_len = body.len()))]
    pub async fn handle(&self, body: &[u8]) -> AppResult<OrderCommand> {
        let request: CreateOrderRequest = serde_json::from_slice(body).map_err(|e| {
            metrics::record_order_received("rejected");
            warn!(error = %e, "Rejected order request");
            AppError::BadRequest(format!(
                "error while processing new order request: {}",
                sanitize_serde_error(&e)
            ))
        })?;

        self.submit(request).await
    }

    /// Build a command from a parsed request and publish it keyed by its id.
    #[instrument(skip_all, fields(price = request.price))]
    pub async fn submit(&self, request: CreateOrderRequest) -> AppResult<OrderCommand> {
        let command = OrderCommand::new(Uuid::new_v4(), request, self.clock.now());

        let payload = codec::encode(&command).map_err(|e| {
            metrics::record_order_received("failed");
            error!(order_id = %command.order_id, error = %e, "Failed to encode order command");
            AppError::Processing(e.to_string())
        })?;

        self.writer
            .publish(command.partition_key(), payload, self.publish_timeout)
            .await
            .map_err(|e| {
                metrics::record_order_received("failed");
                error!(
                    order_id = %command.order_id,
                    retryable = e.is_retryable(),
                    error = %e,
                    "Failed to publish order command"
                );
                AppError::Processing(format!("error while push message into log: {e}"))
            })?;

        self.orders_accepted.fetch_add(1, Ordering::Relaxed);
        metrics::record_order_received("accepted");
        info!(order_id = %command.order_id, "Order command published");

        Ok(command)
    }

    /// Orders successfully published since startup.
    pub fn orders_accepted(&self) -> u64 {
        self.orders_accepted.load(Ordering::Relaxed)
    }
}
