//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with defaults
//! suitable for a local broker. In production, configure via environment
//! variables or a `.env` file. Both binaries read the same variables; each
//! uses the subset it needs.
//!
//! # Log Broker
//!
//! - `LOG_BROKERS`: Comma-separated `host:port` list, tried in order (default: `localhost:8090`)
//! - `LOG_STREAM` / `LOG_TOPIC`: Where order commands live (default: `orders` / `orders-new`)
//! - `LOG_PARTITION_STRATEGY`: `least_bytes`, `hash` or `round_robin` (default: `least_bytes`)
//! - `HEALTH_CHECK_INTERVAL_MS`: Broker ping interval of the API (default: 30s)
//!
//! # Consumer Tuning
//!
//! - `FETCH_MIN_BYTES` / `FETCH_MAX_BYTES` / `FETCH_MAX_WAIT_MS`: Fetch bounds
//!   (default: 10KB / 10MB / 1s)
//! - `READ_LAG_INTERVAL_MS`: Lag reporting interval, 0 disables (default: 0)
//! - `PROCESS_MAX_ATTEMPTS`: Processing attempts per record before skipping (default: 3)

use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::log_client::{BrokerConfig, FetchBounds, PartitionStrategy, ReaderConfig, WriterConfig};
use crate::services::LoopOptions;
use crate::validation::{validate_broker_address, validate_partition_count, validate_resource_name};

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}' (expected pretty or json)")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Application configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// let writer = IggyLogWriter::connect(config.writer_config()).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 3000)
    pub port: u16,

    /// Maximum request body size in bytes (default: 1MB)
    pub max_request_body_size: usize,

    /// Allowed CORS origins; `*` allows all
    pub cors_allowed_origins: Vec<String>,

    // =========================================================================
    // Log Broker Configuration
    // =========================================================================
    /// Broker addresses, tried in order
    pub brokers: Vec<String>,

    pub username: String,

    pub password: String,

    /// Client identifier reported in logs
    pub client_id: String,

    pub stream: String,

    pub topic: String,

    /// Partition count used when the topic is created
    pub partitions: u32,

    pub partition_strategy: PartitionStrategy,

    /// Per-broker connection timeout (default: 10s)
    pub dial_timeout: Duration,

    /// Upper bound for one publish round trip (default: 10s)
    pub write_timeout: Duration,

    /// Upper bound for metadata round trips (default: 10s)
    pub read_timeout: Duration,

    /// Deadline the ingestion service gives each publish (default: 10s)
    pub publish_timeout: Duration,

    /// Interval between writer pings that refresh readiness (default: 30s)
    pub health_check_interval: Duration,

    // =========================================================================
    // Consumer Configuration
    // =========================================================================
    pub consumer_group: String,

    pub fetch_min_bytes: usize,

    pub fetch_max_bytes: usize,

    pub fetch_max_wait: Duration,

    /// Messages requested per poll
    pub fetch_batch_length: u32,

    /// Lag reporting interval; `None` disables it
    pub read_lag_interval: Option<Duration>,

    /// First delay after a failed read (exponential backoff applies)
    pub read_retry_base_delay: Duration,

    /// Cap on the delay between failed reads
    pub read_retry_max_delay: Duration,

    /// Processing attempts per record before it is skipped
    pub process_max_attempts: u32,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Log level filter (e.g., "info", "debug", "order_pipeline=trace")
    pub log_level: String,

    pub log_format: LogFormat,

    /// Prometheus port for the API (default: 9090, 0 = disabled)
    pub metrics_port: u16,

    /// Prometheus port for the worker (default: 9091, 0 = disabled)
    pub worker_metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if a value cannot be parsed or the
    /// resulting configuration is inconsistent.
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or(defaults.host),
            port: Self::parse_env("PORT", defaults.port)?,
            max_request_body_size: Self::parse_env(
                "MAX_REQUEST_BODY_SIZE",
                defaults.max_request_body_size,
            )?,
            cors_allowed_origins: Self::parse_list("CORS_ALLOWED_ORIGINS", "*"),

            // Log broker
            brokers: Self::parse_list("LOG_BROKERS", "localhost:8090"),
            username: env::var("LOG_USERNAME").unwrap_or(defaults.username),
            password: env::var("LOG_PASSWORD").unwrap_or(defaults.password),
            client_id: env::var("LOG_CLIENT_ID").unwrap_or(defaults.client_id),
            stream: env::var("LOG_STREAM").unwrap_or(defaults.stream),
            topic: env::var("LOG_TOPIC").unwrap_or(defaults.topic),
            partitions: Self::parse_env("LOG_PARTITIONS", defaults.partitions)?,
            partition_strategy: Self::parse_env(
                "LOG_PARTITION_STRATEGY",
                defaults.partition_strategy,
            )?,
            dial_timeout: Self::parse_millis("LOG_DIAL_TIMEOUT_MS", defaults.dial_timeout)?,
            write_timeout: Self::parse_millis("LOG_WRITE_TIMEOUT_MS", defaults.write_timeout)?,
            read_timeout: Self::parse_millis("LOG_READ_TIMEOUT_MS", defaults.read_timeout)?,
            publish_timeout: Self::parse_millis("PUBLISH_TIMEOUT_MS", defaults.publish_timeout)?,
            health_check_interval: Self::parse_millis(
                "HEALTH_CHECK_INTERVAL_MS",
                defaults.health_check_interval,
            )?,

            // Consumer
            consumer_group: env::var("CONSUMER_GROUP").unwrap_or(defaults.consumer_group),
            fetch_min_bytes: Self::parse_env("FETCH_MIN_BYTES", defaults.fetch_min_bytes)?,
            fetch_max_bytes: Self::parse_env("FETCH_MAX_BYTES", defaults.fetch_max_bytes)?,
            fetch_max_wait: Self::parse_millis("FETCH_MAX_WAIT_MS", defaults.fetch_max_wait)?,
            fetch_batch_length: Self::parse_env("FETCH_BATCH_LENGTH", defaults.fetch_batch_length)?,
            read_lag_interval: Some(Self::parse_millis("READ_LAG_INTERVAL_MS", Duration::ZERO)?)
                .filter(|interval| !interval.is_zero()),
            read_retry_base_delay: Self::parse_millis(
                "READ_RETRY_BASE_DELAY_MS",
                defaults.read_retry_base_delay,
            )?,
            read_retry_max_delay: Self::parse_millis(
                "READ_RETRY_MAX_DELAY_MS",
                defaults.read_retry_max_delay,
            )?,
            process_max_attempts: Self::parse_env(
                "PROCESS_MAX_ATTEMPTS",
                defaults.process_max_attempts,
            )?,

            // Observability
            log_level: env::var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: Self::parse_env("LOG_FORMAT", defaults.log_format)?,
            metrics_port: Self::parse_env("METRICS_PORT", defaults.metrics_port)?,
            worker_metrics_port: Self::parse_env(
                "WORKER_METRICS_PORT",
                defaults.worker_metrics_port,
            )?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if validation fails.
    pub fn validate(&self) -> AppResult<()> {
        if self.brokers.is_empty() {
            return Err(AppError::ConfigError(
                "LOG_BROKERS must list at least one broker".to_string(),
            ));
        }
        for broker in &self.brokers {
            validate_broker_address(broker)?;
        }

        validate_resource_name(&self.stream, "Stream")?;
        validate_resource_name(&self.topic, "Topic")?;
        validate_resource_name(&self.consumer_group, "Consumer group")?;
        validate_partition_count(self.partitions, "Topic")?;

        for (name, timeout) in [
            ("LOG_DIAL_TIMEOUT_MS", self.dial_timeout),
            ("LOG_WRITE_TIMEOUT_MS", self.write_timeout),
            ("LOG_READ_TIMEOUT_MS", self.read_timeout),
            ("PUBLISH_TIMEOUT_MS", self.publish_timeout),
            ("HEALTH_CHECK_INTERVAL_MS", self.health_check_interval),
            ("FETCH_MAX_WAIT_MS", self.fetch_max_wait),
        ] {
            if timeout.is_zero() {
                return Err(AppError::ConfigError(format!(
                    "{name} must be greater than 0"
                )));
            }
        }

        if self.fetch_max_bytes == 0 {
            return Err(AppError::ConfigError(
                "FETCH_MAX_BYTES must be greater than 0".to_string(),
            ));
        }

        if self.fetch_min_bytes > self.fetch_max_bytes {
            return Err(AppError::ConfigError(format!(
                "FETCH_MIN_BYTES ({}) must be <= FETCH_MAX_BYTES ({})",
                self.fetch_min_bytes, self.fetch_max_bytes
            )));
        }

        if self.fetch_batch_length == 0 {
            return Err(AppError::ConfigError(
                "FETCH_BATCH_LENGTH must be greater than 0".to_string(),
            ));
        }

        if self.read_retry_base_delay > self.read_retry_max_delay {
            return Err(AppError::ConfigError(format!(
                "READ_RETRY_BASE_DELAY_MS ({:?}) must be <= READ_RETRY_MAX_DELAY_MS ({:?})",
                self.read_retry_base_delay, self.read_retry_max_delay
            )));
        }

        if self.process_max_attempts == 0 {
            return Err(AppError::ConfigError(
                "PROCESS_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        if self.max_request_body_size == 0 {
            return Err(AppError::ConfigError(
                "MAX_REQUEST_BODY_SIZE must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Broker connectivity shared by writer and reader.
    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig::new(self.brokers.clone(), &self.username, &self.password)
            .with_client_id(&self.client_id)
            .with_dial_timeout(self.dial_timeout)
            .with_read_timeout(self.read_timeout)
    }

    pub fn writer_config(&self) -> WriterConfig {
        WriterConfig::new(self.broker_config(), &self.stream, &self.topic)
            .with_partitions(self.partitions)
            .with_strategy(self.partition_strategy)
            .with_write_timeout(self.write_timeout)
    }

    pub fn reader_config(&self) -> ReaderConfig {
        ReaderConfig::new(
            self.broker_config(),
            &self.consumer_group,
            &self.stream,
            &self.topic,
        )
        .with_partitions(self.partitions)
        .with_fetch(FetchBounds::new(
            self.fetch_min_bytes,
            self.fetch_max_bytes,
            self.fetch_max_wait,
        ))
        .with_batch_length(self.fetch_batch_length)
        .with_read_lag_interval(self.read_lag_interval)
    }

    /// Retry behaviour of the processing loop.
    pub fn loop_options(&self) -> LoopOptions {
        LoopOptions {
            read_retry_base_delay: self.read_retry_base_delay,
            read_retry_max_delay: self.read_retry_max_delay,
            process_max_attempts: self.process_max_attempts,
        }
    }

    /// Prometheus address for the API, `None` when disabled.
    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        Self::listen_addr(self.metrics_port)
    }

    /// Prometheus address for the worker, `None` when disabled.
    pub fn worker_metrics_addr(&self) -> Option<SocketAddr> {
        Self::listen_addr(self.worker_metrics_port)
    }

    fn listen_addr(port: u16) -> Option<SocketAddr> {
        (port > 0).then(|| SocketAddr::from(([0, 0, 0, 0], port)))
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Parse a millisecond count into a `Duration`.
    fn parse_millis(name: &str, default: Duration) -> AppResult<Duration> {
        let millis = Self::parse_env(name, default.as_millis() as u64)?;
        Ok(Duration::from_millis(millis))
    }

    /// Parse a comma-separated list, dropping empty entries.
    fn parse_list(name: &str, default: &str) -> Vec<String> {
        split_list(&env::var(name).unwrap_or_else(|_| default.to_string()))
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Server
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_request_body_size: 1024 * 1024, // 1MB
            cors_allowed_origins: vec!["*".to_string()],
            // Log broker
            brokers: vec!["localhost:8090".to_string()],
            username: "iggy".to_string(),
            password: "iggy".to_string(),
            client_id: "order-pipeline".to_string(),
            stream: "orders".to_string(),
            topic: "orders-new".to_string(),
            partitions: 3,
            partition_strategy: PartitionStrategy::LeastBytes,
            dial_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(10),
            publish_timeout: Duration::from_secs(10),
            health_check_interval: Duration::from_secs(30),
            // Consumer
            consumer_group: "consumer-group-id".to_string(),
            fetch_min_bytes: 10_000,    // 10KB
            fetch_max_bytes: 10_000_000, // 10MB
            fetch_max_wait: Duration::from_secs(1),
            fetch_batch_length: 100,
            read_lag_interval: None,
            read_retry_base_delay: Duration::from_millis(100),
            read_retry_max_delay: Duration::from_secs(10),
            process_max_attempts: 3,
            // Observability
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_port: 9090,
            worker_metrics_port: 9091,
        }
    }
}
