//! Iggy-backed [`LogWriter`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use iggy::prelude::*;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use super::connection::{ConnectionState, dial, ensure_topic};
use super::helpers::to_identifier;
use super::{Balancer, LogWriter, WriterConfig, envelope};
use crate::error::{AppResult, PublishError};
use crate::metrics;

/// Writer that publishes enveloped records to one Iggy topic.
///
/// # Concurrency
///
/// The client sits behind a `tokio::sync::RwLock<Option<_>>`. Publishes take
/// the read lock, so any number run concurrently. `close` takes the write
/// lock, which waits for in-flight publishes to finish, then drops the client.
/// A `None` client means the writer is closed.
pub struct IggyLogWriter {
    client: RwLock<Option<IggyClient>>,
    config: WriterConfig,
    stream_id: Identifier,
    topic_id: Identifier,
    balancer: Balancer,
    state: Arc<ConnectionState>,
}

impl IggyLogWriter {
    /// Dial a broker, provision the topic and return a ready writer.
    ///
    /// # Errors
    ///
    /// - `AppError::ConnectionFailed` when no broker accepts the connection
    /// - `AppError::TopicError` when the stream or topic cannot be provisioned
    /// - `AppError::ConfigError` when the stream or topic name is invalid
    #[instrument(skip(config), fields(client_id = %config.broker.client_id, topic = %config.topic))]
    pub async fn connect(config: WriterConfig) -> AppResult<Self> {
        let stream_id = to_identifier(&config.stream, "stream")?;
        let topic_id = to_identifier(&config.topic, "topic")?;

        let (client, broker) = dial(&config.broker).await?;
        let partitions = ensure_topic(
            &client,
            &config.stream,
            &config.topic,
            config.partitions,
            config.broker.read_timeout,
        )
        .await?;

        let state = Arc::new(ConnectionState::new("writer"));
        state.set_connected(true);

        info!(
            broker,
            partitions,
            strategy = %config.strategy,
            "Log writer ready"
        );

        Ok(Self {
            client: RwLock::new(Some(client)),
            balancer: Balancer::new(config.strategy, partitions),
            config,
            stream_id,
            topic_id,
            state,
        })
    }

    /// Partition count the writer balances over.
    pub fn partitions(&self) -> u32 {
        self.balancer.partitions()
    }
}

#[async_trait]
impl LogWriter for IggyLogWriter {
    #[instrument(
        skip_all,
        fields(topic = %self.config.topic, key_len = key.len(), value_len = value.len())
    )]
    async fn publish(
        &self,
        key: Bytes,
        value: Bytes,
        deadline: Duration,
    ) -> Result<(), PublishError> {
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or(PublishError::Closed)?;

        let frame = envelope::encode(&key, Utc::now(), &value)
            .map_err(|e| PublishError::InvalidRecord(e.to_string()))?;
        let message = IggyMessage::builder()
            .payload(frame)
            .build()
            .map_err(|e| PublishError::InvalidRecord(e.to_string()))?;

        let partition = self.balancer.select(&key, value.len());
        let partitioning = Partitioning::partition_id(partition);
        let budget = deadline.min(self.config.write_timeout);

        let started = Instant::now();
        let mut messages = vec![message];
        let result = timeout(
            budget,
            client.send_messages(&self.stream_id, &self.topic_id, &partitioning, &mut messages),
        )
        .await;
        metrics::record_publish_duration(&self.config.topic, started.elapsed().as_secs_f64());

        match result {
            Ok(Ok(())) => {
                self.state.set_connected(true);
                metrics::record_published(&self.config.topic, "success");
                debug!(partition, "Record published");
                Ok(())
            }
            Ok(Err(e)) => {
                let failures = self.state.record_failure();
                metrics::record_published(&self.config.topic, "error");
                warn!(partition, failures, error = %e, "Publish failed");
                Err(PublishError::Unavailable(e.to_string()))
            }
            Err(_) => {
                let failures = self.state.record_failure();
                metrics::record_published(&self.config.topic, "timeout");
                warn!(partition, failures, timeout = ?budget, "Publish timed out");
                Err(PublishError::Timeout(budget))
            }
        }
    }

    #[instrument(skip(self), fields(topic = %self.config.topic))]
    async fn ping(&self) -> Result<(), PublishError> {
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or(PublishError::Closed)?;
        let budget = self.config.write_timeout;

        match timeout(budget, client.ping()).await {
            Ok(Ok(())) => {
                if !self.state.is_connected() {
                    info!("Log broker reachable again");
                }
                self.state.set_connected(true);
                Ok(())
            }
            Ok(Err(e)) => {
                let failures = self.state.record_failure();
                warn!(failures, error = %e, "Broker ping failed");
                Err(PublishError::Unavailable(e.to_string()))
            }
            Err(_) => {
                let failures = self.state.record_failure();
                warn!(failures, timeout = ?budget, "Broker ping timed out");
                Err(PublishError::Timeout(budget))
            }
        }
    }

    #[instrument(skip(self), fields(topic = %self.config.topic))]
    async fn close(&self) -> Result<(), PublishError> {
        let mut guard = self.client.write().await;
        let Some(client) = guard.take() else {
            debug!("Log writer already closed");
            return Ok(());
        };

        self.state.set_connected(false);
        if let Err(e) = client.disconnect().await {
            warn!(error = %e, "Disconnect failed; dropping connection");
        }
        info!("Log writer closed");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.is_connected()
    }
}
