//! Partitioned log client.
//!
//! Two narrow capabilities sit on top of the Iggy SDK:
//!
//! - **[`LogWriter`]**: publish one keyed record with a deadline, close idempotently
//! - **[`LogReader`]**: fetch the next record for a consumer group, commit its offset, close
//!
//! ```text
//! ┌──────────────┐  publish(key, value)  ┌────────────┐  envelope  ┌──────────────┐
//! │ OrderService ├──────────────────────►│  Balancer  ├───────────►│  Iggy topic  │
//! └──────────────┘                       └────────────┘            │  (N parts)   │
//!                                                                  └──────┬───────┘
//! ┌────────────────┐  next() / commit()  ┌──────────────────┐   poll      │
//! │ ProcessingLoop │◄────────────────────┤  IggyLogReader   │◄────────────┘
//! └────────────────┘                     │  (fetch buffer)  │
//!                                        └──────────────────┘
//! ```
//!
//! Iggy messages carry no key, so the writer wraps every record in a small
//! binary envelope (see [`envelope`]) and the reader unwraps it again.
//! Partition selection happens client-side in [`Balancer`].
//!
//! # Module Structure
//!
//! - `balancer` - Partition selection strategies
//! - `connection` - Broker dialing, topic provisioning, connection state
//! - `envelope` - Key/timestamp framing around record values
//! - `helpers` - Identifier conversion, jitter, backoff
//! - `memory` - In-process log used by tests and local runs
//! - `params` - Writer and reader configuration
//! - `reader` / `writer` - Iggy-backed implementations

mod balancer;
mod connection;
pub mod envelope;
mod helpers;
mod memory;
mod params;
mod reader;
mod writer;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::{PublishError, ReadError};

pub use balancer::{Balancer, PartitionStrategy};
pub use connection::{ConnectionState, dial, ensure_topic};
pub use helpers::{Backoff, LagReporter, rand_jitter, to_identifier};
pub use memory::{MemoryLog, MemoryReader, MemoryWriter};
pub use params::{BrokerConfig, FetchBounds, ReaderConfig, WriterConfig};
pub use reader::IggyLogReader;
pub use writer::IggyLogWriter;

/// A record as delivered to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Partition the record was read from (0-based)
    pub partition: u32,
    /// Position of the record within its partition
    pub offset: u64,
    pub key: Bytes,
    pub value: Bytes,
    /// Time the writer handed the record to the broker
    pub timestamp: DateTime<Utc>,
}

impl Record {
    /// Payload size used for fetch byte accounting.
    pub fn size(&self) -> usize {
        self.key.len() + self.value.len()
    }
}

/// Producer side of the log.
///
/// Implementations are shared between request handlers, so every method
/// takes `&self`. A successful `publish` means the broker acknowledged the
/// record; on error the record may or may not have been written.
#[async_trait]
pub trait LogWriter: Send + Sync {
    /// Append one record to the topic, waiting at most `deadline`.
    async fn publish(
        &self,
        key: Bytes,
        value: Bytes,
        deadline: Duration,
    ) -> Result<(), PublishError>;

    /// Round-trip to the broker and refresh the connection state.
    ///
    /// A successful ping marks the writer connected again after failed
    /// publishes; a failed one marks it disconnected.
    async fn ping(&self) -> Result<(), PublishError>;

    /// Flush in-flight publishes and release the connection.
    ///
    /// Safe to call more than once; publishing afterwards yields
    /// [`PublishError::Closed`].
    async fn close(&self) -> Result<(), PublishError>;

    /// Last known connection state.
    fn is_connected(&self) -> bool;
}

/// Consumer side of the log, bound to one consumer group.
///
/// Records are returned in offset order per partition. Offsets only move
/// forward when [`LogReader::commit`] is called.
#[async_trait]
pub trait LogReader: Send {
    /// Next record for this group member.
    ///
    /// Returns `Ok(None)` when the fetch wait elapsed without any data.
    async fn next(&mut self) -> Result<Option<Record>, ReadError>;

    /// Mark `record` as consumed for the group.
    async fn commit(&mut self, record: &Record) -> Result<(), ReadError>;

    /// Leave the group and release the connection. Idempotent.
    async fn close(&mut self) -> Result<(), ReadError>;
}
