//! Broker dialing, topic provisioning and connection state tracking.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use iggy::prelude::*;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use super::BrokerConfig;
use super::helpers::to_identifier;
use crate::error::{AppError, AppResult};
use crate::metrics;

/// Last known connection state of one writer or reader.
///
/// All atomic operations use `SeqCst` ordering. Every transition is
/// mirrored into the `log_connection_status` gauge under `role`.
#[derive(Debug)]
pub struct ConnectionState {
    role: &'static str,
    connected: AtomicBool,
    consecutive_failures: AtomicU32,
}

impl ConnectionState {
    pub fn new(role: &'static str) -> Self {
        Self {
            role,
            connected: AtomicBool::new(false),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
        if connected {
            self.consecutive_failures.store(0, Ordering::SeqCst);
        }
        metrics::set_connection_status(self.role, connected);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Record a failed broker round trip. Returns the failure streak length.
    pub fn record_failure(&self) -> u32 {
        self.connected.store(false, Ordering::SeqCst);
        metrics::set_connection_status(self.role, false);
        self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Connect to the first reachable broker.
///
/// Brokers are tried in configuration order, each bounded by the dial
/// timeout. Returns the connected client and the address that answered;
/// when every broker fails, the error lists each attempt.
#[instrument(skip(config), fields(client_id = %config.client_id))]
pub async fn dial(config: &BrokerConfig) -> AppResult<(IggyClient, String)> {
    let mut attempts = Vec::with_capacity(config.brokers.len());

    for broker in &config.brokers {
        let client = IggyClient::builder()
            .with_tcp()
            .with_server_address(broker.clone())
            .with_auto_sign_in(config.auto_login())
            .build();
        let client = match client {
            Ok(client) => client,
            Err(e) => {
                warn!(broker, error = %e, "Invalid broker connection settings");
                attempts.push(format!("{broker}: {e}"));
                continue;
            }
        };

        match timeout(config.dial_timeout, client.connect()).await {
            Ok(Ok(())) => {
                info!(broker, "Connected to log broker");
                return Ok((client, broker.clone()));
            }
            Ok(Err(e)) => {
                warn!(broker, error = %e, "Broker connection failed");
                attempts.push(format!("{broker}: {e}"));
            }
            Err(_) => {
                warn!(broker, timeout = ?config.dial_timeout, "Broker connection timed out");
                attempts.push(format!("{broker}: timed out after {:?}", config.dial_timeout));
            }
        }
    }

    if attempts.is_empty() {
        return Err(AppError::ConnectionFailed(
            "no broker addresses configured".to_string(),
        ));
    }
    Err(AppError::ConnectionFailed(attempts.join("; ")))
}

/// Make sure `stream` and `topic` exist, creating them if necessary.
///
/// Returns the topic's actual partition count, which can differ from
/// `partitions` when the topic already existed. The whole exchange is
/// bounded by `deadline`.
#[instrument(skip(client))]
pub async fn ensure_topic(
    client: &IggyClient,
    stream: &str,
    topic: &str,
    partitions: u32,
    deadline: Duration,
) -> AppResult<u32> {
    let provision = async {
        let stream_id = to_identifier(stream, "stream")?;
        let topic_id = to_identifier(topic, "topic")?;

        match client.get_stream(&stream_id).await {
            Ok(Some(_)) => debug!(stream, "Stream already exists"),
            Ok(None) | Err(_) => {
                info!(stream, "Creating stream");
                if let Err(e) = client.create_stream(stream).await {
                    // Another process may have created it in the meantime.
                    if !matches!(client.get_stream(&stream_id).await, Ok(Some(_))) {
                        return Err(AppError::TopicError(format!(
                            "failed to create stream '{stream}': {e}"
                        )));
                    }
                }
            }
        }

        match client.get_topic(&stream_id, &topic_id).await {
            Ok(Some(details)) => {
                debug!(
                    stream,
                    topic,
                    partitions = details.partitions_count,
                    "Topic already exists"
                );
                Ok(details.partitions_count)
            }
            Ok(None) | Err(_) => {
                info!(stream, topic, partitions, "Creating topic");
                let created = client
                    .create_topic(
                        &stream_id,
                        topic,
                        partitions,
                        Default::default(),
                        None,
                        IggyExpiry::NeverExpire,
                        MaxTopicSize::Unlimited,
                    )
                    .await;

                match created {
                    Ok(_) => Ok(partitions),
                    Err(e) => match client.get_topic(&stream_id, &topic_id).await {
                        Ok(Some(details)) => Ok(details.partitions_count),
                        _ => Err(AppError::TopicError(format!(
                            "failed to create topic '{topic}': {e}"
                        ))),
                    },
                }
            }
        }
    };

    timeout(deadline, provision).await.map_err(|_| {
        AppError::TopicError(format!(
            "provisioning {stream}/{topic} timed out after {deadline:?}"
        ))
    })?
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_initial() {
        let state = ConnectionState::new("writer");

        assert!(!state.is_connected());
        assert_eq!(state.record_failure(), 1);
    }

    #[test]
    fn test_connection_state_failures_reset_on_connect() {
        let state = ConnectionState::new("reader");

        state.set_connected(true);
        assert_eq!(state.record_failure(), 1);
        assert_eq!(state.record_failure(), 2);
        assert!(!state.is_connected());

        state.set_connected(true);
        assert!(state.is_connected());
        assert_eq!(state.record_failure(), 1);
    }

    #[tokio::test]
    async fn test_dial_without_brokers_fails() {
        let config = BrokerConfig::new(Vec::new(), "iggy", "iggy");

        let result = dial(&config).await;
        assert!(matches!(result, Err(AppError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn test_dial_unreachable_broker_fails_within_timeout() {
        // Port 1 on localhost refuses connections or times out quickly.
        let config = BrokerConfig::new(vec!["127.0.0.1:1".to_string()], "iggy", "iggy")
            .with_dial_timeout(Duration::from_millis(500));

        let result = tokio::time::timeout(Duration::from_secs(10), dial(&config))
            .await
            .expect("dial should respect its timeout");
        assert!(matches!(result, Err(AppError::ConnectionFailed(_))));
    }
}
