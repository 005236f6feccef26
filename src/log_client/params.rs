//! Configuration types for log writers and readers.

use std::time::Duration;

use iggy::prelude::AutoLogin;
use iggy_common::Credentials;

use super::PartitionStrategy;

/// Default dial, write and read timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default minimum bytes a fetch accumulates before returning.
pub const DEFAULT_MIN_BYTES: usize = 10_000;
/// Default upper bound on bytes per fetch.
pub const DEFAULT_MAX_BYTES: usize = 10_000_000;
/// Default longest time a fetch waits for `min_bytes`.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(1);
/// Default number of messages requested per poll.
pub const DEFAULT_BATCH_LENGTH: u32 = 100;
/// Default interval between polls while the topic is idle.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Broker connectivity shared by writers and readers.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Broker addresses (`host:port`), tried in order
    pub brokers: Vec<String>,
    pub username: String,
    pub password: String,
    /// Identifies this client in logs and tracing spans. The broker is not
    /// told about it; it only sees the authenticated user.
    pub client_id: String,
    /// Upper bound for establishing a connection to one broker
    pub dial_timeout: Duration,
    /// Upper bound for metadata round trips (stream/topic provisioning)
    pub read_timeout: Duration,
}

impl BrokerConfig {
    /// Create broker settings with default timeouts.
    pub fn new(
        brokers: Vec<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            brokers,
            username: username.into(),
            password: password.into(),
            client_id: "order-pipeline".to_string(),
            dial_timeout: DEFAULT_TIMEOUT,
            read_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sign-in the client performs on every (re)connect.
    ///
    /// Credentials are handed over as-is and never embedded in a connection
    /// string, so any character is allowed in them.
    pub fn auto_login(&self) -> AutoLogin {
        AutoLogin::Enabled(Credentials::UsernamePassword(
            self.username.clone(),
            self.password.clone(),
        ))
    }
}

/// Settings for a [`super::IggyLogWriter`].
///
/// # Example
///
/// ```rust,ignore
/// let config = WriterConfig::new(broker, "orders", "orders-new")
///     .with_partitions(3)
///     .with_strategy(PartitionStrategy::Hash);
///
/// let writer = IggyLogWriter::connect(config).await?;
/// ```
#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub broker: BrokerConfig,
    pub stream: String,
    pub topic: String,
    /// Partition count used when the topic has to be created
    pub partitions: u32,
    pub strategy: PartitionStrategy,
    /// Upper bound for one publish, regardless of the caller's deadline
    pub write_timeout: Duration,
}

impl WriterConfig {
    pub fn new(broker: BrokerConfig, stream: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            broker,
            stream: stream.into(),
            topic: topic.into(),
            partitions: 1,
            strategy: PartitionStrategy::default(),
            write_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_partitions(mut self, partitions: u32) -> Self {
        self.partitions = partitions;
        self
    }

    pub fn with_strategy(mut self, strategy: PartitionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }
}

/// Byte and time bounds of a single fetch.
///
/// A fetch returns once `min_bytes` are buffered, once `max_bytes` would be
/// exceeded, or once `max_wait` elapses, whichever comes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchBounds {
    pub min_bytes: usize,
    pub max_bytes: usize,
    pub max_wait: Duration,
}

impl FetchBounds {
    pub fn new(min_bytes: usize, max_bytes: usize, max_wait: Duration) -> Self {
        Self {
            min_bytes,
            max_bytes,
            max_wait,
        }
    }
}

impl Default for FetchBounds {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_BYTES, DEFAULT_MAX_BYTES, DEFAULT_MAX_WAIT)
    }
}

/// Settings for an [`super::IggyLogReader`].
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    pub broker: BrokerConfig,
    /// Consumer group shared by all workers
    pub group: String,
    pub stream: String,
    pub topic: String,
    /// Partition count used when the topic has to be created
    pub partitions: u32,
    pub fetch: FetchBounds,
    pub batch_length: u32,
    pub poll_interval: Duration,
    /// Emit lag at most once per interval; `None` disables lag reporting
    pub read_lag_interval: Option<Duration>,
}

impl ReaderConfig {
    pub fn new(
        broker: BrokerConfig,
        group: impl Into<String>,
        stream: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            group: group.into(),
            stream: stream.into(),
            topic: topic.into(),
            partitions: 1,
            fetch: FetchBounds::default(),
            batch_length: DEFAULT_BATCH_LENGTH,
            poll_interval: DEFAULT_POLL_INTERVAL,
            read_lag_interval: None,
        }
    }

    pub fn with_partitions(mut self, partitions: u32) -> Self {
        self.partitions = partitions;
        self
    }

    pub fn with_fetch(mut self, fetch: FetchBounds) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn with_batch_length(mut self, batch_length: u32) -> Self {
        self.batch_length = batch_length;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_read_lag_interval(mut self, interval: Option<Duration>) -> Self {
        self.read_lag_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broker() -> BrokerConfig {
        BrokerConfig::new(vec!["localhost:8090".to_string()], "iggy", "secret")
    }

    #[test]
    fn test_auto_login_passes_credentials_verbatim() {
        let brokers = vec!["localhost:8090".to_string()];
        let config = BrokerConfig::new(brokers, "ops@acme", "p@ss:w/rd%");

        assert_eq!(
            config.auto_login(),
            AutoLogin::Enabled(Credentials::UsernamePassword(
                "ops@acme".to_string(),
                "p@ss:w/rd%".to_string()
            ))
        );
    }

    #[test]
    fn test_writer_config_defaults() {
        let config = WriterConfig::new(broker(), "orders", "orders-new");

        assert_eq!(config.partitions, 1);
        assert_eq!(config.strategy, PartitionStrategy::LeastBytes);
        assert_eq!(config.write_timeout, Duration::from_secs(10));
        assert_eq!(config.broker.dial_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_reader_config_builder_chain() {
        let config = ReaderConfig::new(broker(), "consumer-group-id", "orders", "orders-new")
            .with_partitions(3)
            .with_fetch(FetchBounds::new(1, 1024, Duration::from_millis(50)))
            .with_batch_length(10)
            .with_read_lag_interval(Some(Duration::from_secs(5)));

        assert_eq!(config.group, "consumer-group-id");
        assert_eq!(config.partitions, 3);
        assert_eq!(config.fetch.min_bytes, 1);
        assert_eq!(config.fetch.max_bytes, 1024);
        assert_eq!(config.batch_length, 10);
        assert_eq!(config.read_lag_interval, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_fetch_bounds_defaults() {
        let fetch = FetchBounds::default();

        assert_eq!(fetch.min_bytes, 10_000);
        assert_eq!(fetch.max_bytes, 10_000_000);
        assert_eq!(fetch.max_wait, Duration::from_secs(1));
    }
}
