//! Consumer-side processing loop.
//!
//! ```text
//!   ┌──────────► next() ──── Err ───► backoff (cancellable) ──┐
//!   │              │                                          │
//!   │            Ok(None) ── idle, loop again                 │
//!   │              │                                          │
//!   │          decode ────── Err ───► warn, commit, skip      │
//!   │              │                                          │
//!   │          process ───── Err ───► retry up to N, then     │
//!   │              │                  error, commit, skip     │
//!   │            commit                                       │
//!   └──────────────┴──────────────────────────────────────────┘
//! ```
//!
//! Offsets are committed only after the outcome of a record is known, so
//! delivery is at-least-once: a crash between processing and commit hands
//! the record to the next group member again.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::codec;
use crate::error::ProcessError;
use crate::log_client::{Backoff, LogReader, Record};
use crate::metrics;
use crate::models::OrderCommand;

/// Where a command came from on the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMeta {
    pub partition: u32,
    pub offset: u64,
    pub key: Bytes,
    pub timestamp: DateTime<Utc>,
}

impl From<&Record> for RecordMeta {
    fn from(record: &Record) -> Self {
        Self {
            partition: record.partition,
            offset: record.offset,
            key: record.key.clone(),
            timestamp: record.timestamp,
        }
    }
}

/// Downstream handling of decoded order commands.
#[async_trait]
pub trait CommandProcessor: Send + Sync {
    async fn process(&self, command: &OrderCommand, meta: &RecordMeta) -> Result<(), ProcessError>;
}

/// Processor that only reports each command it sees.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingProcessor;

#[async_trait]
impl CommandProcessor for LoggingProcessor {
    async fn process(&self, command: &OrderCommand, meta: &RecordMeta) -> Result<(), ProcessError> {
        info!(
            partition = meta.partition,
            offset = meta.offset,
            order_id = %command.order_id,
            price = command.price,
            status = ?command.status,
            "partition[offset]: {}[{}]: {} = {:?}",
            meta.partition,
            meta.offset,
            String::from_utf8_lossy(&meta.key),
            command
        );
        Ok(())
    }
}

/// Retry behaviour of a [`ProcessingLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopOptions {
    pub read_retry_base_delay: Duration,
    pub read_retry_max_delay: Duration,
    /// Attempts per record, including the first
    pub process_max_attempts: u32,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            read_retry_base_delay: Duration::from_millis(100),
            read_retry_max_delay: Duration::from_secs(10),
            process_max_attempts: 3,
        }
    }
}

/// Outcome counters of a loop run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopStats {
    /// Records processed successfully
    pub processed: u64,
    /// Records that could not be decoded
    pub skipped: u64,
    /// Records whose processing kept failing
    pub failed: u64,
    /// Failed fetches and commits
    pub read_errors: u64,
}

/// Reads, decodes, processes and commits records until cancelled.
pub struct ProcessingLoop<R, P> {
    reader: R,
    processor: P,
    options: LoopOptions,
    stats: LoopStats,
}

impl<R, P> ProcessingLoop<R, P>
where
    R: LogReader,
    P: CommandProcessor,
{
    pub fn new(reader: R, processor: P, options: LoopOptions) -> Self {
        Self {
            reader,
            processor,
            options,
            stats: LoopStats::default(),
        }
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Run until `cancel` fires.
    ///
    /// Cancellation is checked before every fetch and interrupts any wait in
    /// progress; a record that was already fetched is finished (processed and
    /// committed) first unless a retry backoff is interrupted.
    #[instrument(skip_all)]
    pub async fn run(&mut self, cancel: &CancellationToken) -> LoopStats {
        let mut backoff = Backoff::new(
            self.options.read_retry_base_delay,
            self.options.read_retry_max_delay,
        );
        info!("Processing loop started");

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = self.reader.next() => next,
            };

            match next {
                Ok(Some(record)) => {
                    backoff.reset();
                    self.handle_record(record, cancel).await;
                }
                Ok(None) => {
                    backoff.reset();
                    debug!("No records within fetch wait");
                }
                Err(e) => {
                    self.stats.read_errors += 1;
                    metrics::record_read_error();
                    let delay = backoff.next_delay();
                    error!(
                        error = %e,
                        attempt = backoff.attempt(),
                        retry_in = ?delay,
                        "Failed to read from log"
                    );
                    if !pause(delay, cancel).await {
                        break;
                    }
                }
            }
        }

        info!(
            processed = self.stats.processed,
            skipped = self.stats.skipped,
            failed = self.stats.failed,
            read_errors = self.stats.read_errors,
            "Processing loop stopped"
        );
        self.stats
    }

    /// Close the reader and return the final counters.
    pub async fn shutdown(mut self) -> LoopStats {
        if let Err(e) = self.reader.close().await {
            warn!(error = %e, "Failed to close log reader");
        }
        self.stats
    }

    async fn handle_record(&mut self, record: Record, cancel: &CancellationToken) {
        let meta = RecordMeta::from(&record);

        let command = match codec::decode(&record.value) {
            Ok(command) => command,
            Err(e) => {
                warn!(
                    partition = meta.partition,
                    offset = meta.offset,
                    error = %e,
                    "Skipping undecodable record"
                );
                self.stats.skipped += 1;
                metrics::record_consumed("skipped");
                self.commit(&record).await;
                return;
            }
        };

        let started = Instant::now();
        match self.dispatch(&command, &meta, cancel).await {
            Some(Ok(())) => {
                self.stats.processed += 1;
                metrics::record_consumed("processed");
            }
            Some(Err(e)) => {
                error!(
                    partition = meta.partition,
                    offset = meta.offset,
                    order_id = %command.order_id,
                    attempts = self.options.process_max_attempts,
                    error = %e,
                    "Giving up on order command"
                );
                self.stats.failed += 1;
                metrics::record_consumed("failed");
            }
            // Cancelled mid-retry: leave the offset for the next member.
            None => return,
        }
        metrics::record_process_duration(started.elapsed().as_secs_f64());

        self.commit(&record).await;
    }

    /// Process with retries. `None` means cancellation interrupted a retry.
    async fn dispatch(
        &self,
        command: &OrderCommand,
        meta: &RecordMeta,
        cancel: &CancellationToken,
    ) -> Option<Result<(), ProcessError>> {
        let attempts = self.options.process_max_attempts.max(1);
        let mut backoff = Backoff::new(
            self.options.read_retry_base_delay,
            self.options.read_retry_max_delay,
        );

        let mut attempt = 1;
        loop {
            match self.processor.process(command, meta).await {
                Ok(()) => return Some(Ok(())),
                Err(e) if attempt >= attempts => return Some(Err(e)),
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!(
                        order_id = %command.order_id,
                        attempt,
                        retry_in = ?delay,
                        error = %e,
                        "Processing failed, retrying"
                    );
                    if !pause(delay, cancel).await {
                        return None;
                    }
                    attempt += 1;
                }
            }
        }
    }

    async fn commit(&mut self, record: &Record) {
        if let Err(e) = self.reader.commit(record).await {
            self.stats.read_errors += 1;
            metrics::record_read_error();
            error!(
                partition = record.partition,
                offset = record.offset,
                error = %e,
                "Failed to commit offset"
            );
        }
    }
}

/// Sleep for `delay` unless cancelled first. Returns `false` on cancellation.
async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = sleep(delay) => true,
    }
}
