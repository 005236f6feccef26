//! Helper functions for the log client.

use std::time::{Duration, Instant};

use iggy::prelude::Identifier;
use tracing::debug;

use crate::error::AppError;
use crate::metrics;

/// Jitter applied to backoff delays (±20%).
const BACKOFF_JITTER_PERCENT: f64 = 0.2;

/// Convert a string to an Identifier, returning an appropriate error on failure.
///
/// Stream and topic names come from configuration, so a bad name is a
/// configuration error rather than a request error.
pub fn to_identifier(name: &str, resource_type: &str) -> Result<Identifier, AppError> {
    name.try_into().map_err(|e: iggy::prelude::IggyError| {
        debug!(
            resource_type,
            name,
            original_error = %e,
            "Identifier conversion failed"
        );
        AppError::ConfigError(format!(
            "Invalid {resource_type} name '{name}': must be 1-255 characters, \
             alphanumeric with dots, underscores, or hyphens, \
             starting and ending with alphanumeric"
        ))
    })
}

/// Generate a random jitter value between 0.0 and 1.0.
pub fn rand_jitter() -> f64 {
    use rand::Rng;
    rand::rng().random::<f64>()
}

/// Exponential backoff with jitter.
///
/// The n-th delay is `base * 2^(n-1)`, capped at `max`, then spread by
/// ±[`BACKOFF_JITTER_PERCENT`]. [`Backoff::reset`] starts the sequence over.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            attempt: 0,
        }
    }

    /// Delay to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);

        let base_ms = self.base.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        let delay_ms = base_ms
            .saturating_mul(2u64.saturating_pow(self.attempt.saturating_sub(1)))
            .min(max_ms);

        let spread = rand_jitter() * 2.0 - 1.0;
        let jitter = (delay_ms as f64 * BACKOFF_JITTER_PERCENT * spread) as i64;
        let final_ms = (delay_ms as i64).saturating_add(jitter).max(1) as u64;

        Duration::from_millis(final_ms)
    }

    /// Number of delays handed out since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Rate-limited consumer lag reporting.
///
/// Lag is the distance between the newest offset in a partition and the
/// offset just read. It is logged and exported as a gauge at most once per
/// interval.
#[derive(Debug)]
pub struct LagReporter {
    interval: Option<Duration>,
    last_report: Option<Instant>,
}

impl LagReporter {
    /// `None` disables reporting.
    pub fn new(interval: Option<Duration>) -> Self {
        Self {
            interval,
            last_report: None,
        }
    }

    /// Report lag for a record if the interval has passed. Returns whether a
    /// report was emitted.
    pub fn observe(&mut self, partition: u32, offset: u64, latest_offset: u64) -> bool {
        let Some(interval) = self.interval else {
            return false;
        };

        let now = Instant::now();
        if let Some(last) = self.last_report
            && now.duration_since(last) < interval
        {
            return false;
        }
        self.last_report = Some(now);

        let lag = latest_offset.saturating_sub(offset);
        metrics::set_consumer_lag(partition, lag);
        debug!(partition, offset, lag, "Consumer read lag");
        true
    }
}
