//! Prometheus metrics for the order pipeline.
//!
//! Both binaries can expose these on a dedicated HTTP listener. Recording
//! functions are no-ops until [`init_metrics`] installs the exporter, so
//! library code and tests can call them freely.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `orders_received_total` - Order requests by outcome (accepted, rejected, failed)
//! - `log_records_published_total` - Publishes by topic and status (success, error, timeout)
//! - `log_records_consumed_total` - Consumed records by outcome
//!   (processed, skipped, failed, malformed)
//! - `log_read_errors_total` - Failed fetches from the log
//!
//! ## Histograms
//! - `log_publish_duration_seconds` - Time spent in one publish
//! - `order_process_duration_seconds` - Time spent processing one command
//!
//! ## Gauges
//! - `log_connection_status` - 1 = connected, 0 = disconnected (label: role)
//! - `log_consumer_lag` - Records between the read position and the partition head

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const ORDERS_RECEIVED_TOTAL: &str = "orders_received_total";
    pub const RECORDS_PUBLISHED_TOTAL: &str = "log_records_published_total";
    pub const RECORDS_CONSUMED_TOTAL: &str = "log_records_consumed_total";
    pub const READ_ERRORS_TOTAL: &str = "log_read_errors_total";
    pub const PUBLISH_DURATION_SECONDS: &str = "log_publish_duration_seconds";
    pub const PROCESS_DURATION_SECONDS: &str = "order_process_duration_seconds";
    pub const CONNECTION_STATUS: &str = "log_connection_status";
    pub const CONSUMER_LAG: &str = "log_consumer_lag";
}

/// Install the Prometheus exporter and describe all metrics.
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::ORDERS_RECEIVED_TOTAL,
        "Order requests received, by outcome"
    );
    describe_counter!(
        names::RECORDS_PUBLISHED_TOTAL,
        "Records published to the log, by status"
    );
    describe_counter!(
        names::RECORDS_CONSUMED_TOTAL,
        "Records consumed from the log, by outcome"
    );
    describe_counter!(names::READ_ERRORS_TOTAL, "Failed fetches from the log");

    describe_histogram!(
        names::PUBLISH_DURATION_SECONDS,
        "Publish duration in seconds"
    );
    describe_histogram!(
        names::PROCESS_DURATION_SECONDS,
        "Order command processing duration in seconds"
    );

    describe_gauge!(
        names::CONNECTION_STATUS,
        "Log connection status (1 = connected, 0 = disconnected)"
    );
    describe_gauge!(
        names::CONSUMER_LAG,
        "Records between the consumer position and the partition head"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

// =============================================================================
// Counters
// =============================================================================

pub fn record_order_received(outcome: &'static str) {
    counter!(names::ORDERS_RECEIVED_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_published(topic: &str, status: &'static str) {
    counter!(names::RECORDS_PUBLISHED_TOTAL, "topic" => topic.to_string(), "status" => status)
        .increment(1);
}

pub fn record_consumed(outcome: &'static str) {
    counter!(names::RECORDS_CONSUMED_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_read_error() {
    counter!(names::READ_ERRORS_TOTAL).increment(1);
}

// =============================================================================
// Histograms
// =============================================================================

pub fn record_publish_duration(topic: &str, duration_secs: f64) {
    histogram!(names::PUBLISH_DURATION_SECONDS, "topic" => topic.to_string()).record(duration_secs);
}

pub fn record_process_duration(duration_secs: f64) {
    histogram!(names::PROCESS_DURATION_SECONDS).record(duration_secs);
}

// =============================================================================
// Gauges
// =============================================================================

/// Update the connection gauge for a writer or reader.
pub fn set_connection_status(role: &'static str, connected: bool) {
    gauge!(names::CONNECTION_STATUS, "role" => role).set(if connected { 1.0 } else { 0.0 });
}

pub fn set_consumer_lag(partition: u32, lag: u64) {
    gauge!(names::CONSUMER_LAG, "partition" => partition.to_string()).set(lag as f64);
}
