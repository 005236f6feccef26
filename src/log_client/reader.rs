//! Iggy-backed [`LogReader`].

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use iggy::prelude::*;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, info, instrument, warn};

use super::connection::{ConnectionState, dial, ensure_topic};
use super::helpers::LagReporter;
use super::{LogReader, ReaderConfig, Record, envelope};
use crate::error::{AppError, AppResult, ReadError};
use crate::metrics;

/// Consumer-group member reading one Iggy topic.
///
/// Records are pulled into a local buffer in fetches bounded by
/// [`super::FetchBounds`]. Buffered records survive a cancelled `next`, so
/// dropping the future mid-fetch loses nothing. Offsets are stored manually
/// through [`LogReader::commit`]; nothing is committed automatically.
pub struct IggyLogReader {
    consumer: Option<IggyConsumer>,
    client: Option<IggyClient>,
    config: ReaderConfig,
    buffer: VecDeque<Record>,
    lag: LagReporter,
    state: Arc<ConnectionState>,
}

impl IggyLogReader {
    /// Dial a broker, provision the topic and join the consumer group.
    ///
    /// # Errors
    ///
    /// - `AppError::ConnectionFailed` when no broker accepts the connection
    ///   or the group cannot be joined in time
    /// - `AppError::TopicError` when the stream or topic cannot be provisioned
    #[instrument(skip(config), fields(group = %config.group, topic = %config.topic))]
    pub async fn connect(config: ReaderConfig) -> AppResult<Self> {
        let (client, broker) = dial(&config.broker).await?;
        ensure_topic(
            &client,
            &config.stream,
            &config.topic,
            config.partitions,
            config.broker.read_timeout,
        )
        .await?;

        let mut consumer = client
            .consumer_group(&config.group, &config.stream, &config.topic)
            .map_err(|e| AppError::ConfigError(e.to_string()))?
            .auto_commit(AutoCommit::Disabled)
            .create_consumer_group_if_not_exists()
            .auto_join_consumer_group()
            .polling_strategy(PollingStrategy::next())
            .poll_interval(IggyDuration::from(config.poll_interval))
            .batch_length(config.batch_length)
            .build();

        match timeout(config.broker.read_timeout, consumer.init()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(AppError::ConnectionFailed(e.to_string())),
            Err(_) => {
                return Err(AppError::ConnectionFailed(format!(
                    "joining group '{}' timed out after {:?}",
                    config.group, config.broker.read_timeout
                )));
            }
        }

        let state = Arc::new(ConnectionState::new("reader"));
        state.set_connected(true);
        info!(broker, group = %config.group, "Log reader joined consumer group");

        Ok(Self {
            consumer: Some(consumer),
            client: Some(client),
            lag: LagReporter::new(config.read_lag_interval),
            buffer: VecDeque::new(),
            config,
            state,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Pull records into the buffer until the fetch bounds are met.
    async fn fill(&mut self) -> Result<(), ReadError> {
        let consumer = self.consumer.as_mut().ok_or(ReadError::Closed)?;
        let fetch = self.config.fetch;
        let deadline = Instant::now() + fetch.max_wait;
        let mut fetched = 0usize;

        while fetched < fetch.min_bytes.max(1) && fetched < fetch.max_bytes {
            let received = match timeout_at(deadline, consumer.next()).await {
                Err(_) => break,
                Ok(None) => return Err(ReadError::Closed),
                Ok(Some(Err(e))) => {
                    let failures = self.state.record_failure();
                    if fetched > 0 {
                        // Hand out what we already have; the next fetch will
                        // surface the error again if it persists.
                        warn!(failures, error = %e, "Fetch interrupted");
                        break;
                    }
                    return Err(ReadError::Unavailable(e.to_string()));
                }
                Ok(Some(Ok(received))) => received,
            };
            self.state.set_connected(true);

            let partition = received.partition_id;
            let offset = received.message.header.offset;
            let payload = Bytes::copy_from_slice(&received.message.payload);

            let envelope = match envelope::decode(payload) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(partition, offset, error = %e, "Skipping record with malformed envelope");
                    metrics::record_consumed("malformed");
                    if let Err(e) = consumer.store_offset(offset, Some(partition)).await {
                        warn!(
                            partition,
                            offset,
                            error = %e,
                            "Failed to commit past malformed record"
                        );
                    }
                    continue;
                }
            };

            self.lag.observe(partition, offset, received.current_offset);

            let record = Record {
                partition,
                offset,
                key: envelope.key,
                value: envelope.value,
                timestamp: envelope.timestamp,
            };
            fetched += record.size();
            self.buffer.push_back(record);
        }

        if fetched > 0 {
            debug!(fetched, buffered = self.buffer.len(), "Fetch complete");
        }
        Ok(())
    }
}

#[async_trait]
impl LogReader for IggyLogReader {
    async fn next(&mut self) -> Result<Option<Record>, ReadError> {
        if self.consumer.is_none() {
            return Err(ReadError::Closed);
        }
        if let Some(record) = self.buffer.pop_front() {
            return Ok(Some(record));
        }

        self.fill().await?;
        Ok(self.buffer.pop_front())
    }

    #[instrument(skip_all, fields(partition = record.partition, offset = record.offset))]
    async fn commit(&mut self, record: &Record) -> Result<(), ReadError> {
        let consumer = self.consumer.as_ref().ok_or(ReadError::Closed)?;

        consumer
            .store_offset(record.offset, Some(record.partition))
            .await
            .map_err(|e| {
                self.state.record_failure();
                ReadError::Commit {
                    partition: record.partition,
                    offset: record.offset,
                    reason: e.to_string(),
                }
            })
    }

    #[instrument(skip(self), fields(group = %self.config.group))]
    async fn close(&mut self) -> Result<(), ReadError> {
        self.buffer.clear();
        let Some(consumer) = self.consumer.take() else {
            debug!("Log reader already closed");
            return Ok(());
        };
        drop(consumer);

        if let Some(client) = self.client.take()
            && let Err(e) = client.disconnect().await
        {
            warn!(error = %e, "Disconnect failed; dropping connection");
        }
        self.state.set_connected(false);
        info!("Log reader left consumer group");
        Ok(())
    }
}
