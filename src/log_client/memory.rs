//! In-process partitioned log.
//!
//! Behaves like a broker-backed topic for everything the pipeline relies on:
//! client-side balancing, consumer groups with per-partition committed
//! offsets, group rebalancing when members join or leave, and fetch bounds.
//! Failures can be injected to exercise error paths.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tokio::sync::Notify;
use tokio::time::{Instant, timeout_at};
use tracing::debug;

use super::connection::ConnectionState;
use super::{Balancer, FetchBounds, LogReader, LogWriter, PartitionStrategy, Record};
use crate::error::{PublishError, ReadError};

#[derive(Default)]
struct LogState {
    partitions: Vec<Vec<Record>>,
    /// Next offset to read, per (group, partition)
    committed: HashMap<(String, u32), u64>,
    /// Group members in join order
    members: HashMap<String, Vec<u64>>,
    next_member_id: u64,
    publish_failures: VecDeque<PublishError>,
    ping_failures: VecDeque<PublishError>,
    read_failures: VecDeque<ReadError>,
}

impl LogState {
    /// Partitions owned by `member`: partition `p` goes to the member at
    /// index `p % member_count`.
    fn assignment(&self, group: &str, member: u64) -> Vec<u32> {
        let Some(members) = self.members.get(group) else {
            return Vec::new();
        };
        let Some(index) = members.iter().position(|m| *m == member) else {
            return Vec::new();
        };

        (0..self.partitions.len() as u32)
            .filter(|p| *p as usize % members.len() == index)
            .collect()
    }
}

struct Shared {
    state: Mutex<LogState>,
    changed: Notify,
}

/// Handle to an in-process log. Clones share the same data.
#[derive(Clone)]
pub struct MemoryLog {
    inner: Arc<Shared>,
}

impl MemoryLog {
    /// Create a topic with `partitions` partitions (at least one).
    pub fn new(partitions: u32) -> Self {
        let state = LogState {
            partitions: vec![Vec::new(); partitions.max(1) as usize],
            ..LogState::default()
        };
        Self {
            inner: Arc::new(Shared {
                state: Mutex::new(state),
                changed: Notify::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn partitions(&self) -> u32 {
        self.lock().partitions.len() as u32
    }

    /// A writer that balances records with `strategy`.
    pub fn writer(&self, strategy: PartitionStrategy) -> MemoryWriter {
        let state = ConnectionState::new("writer");
        state.set_connected(true);

        MemoryWriter {
            log: self.clone(),
            balancer: Balancer::new(strategy, self.partitions()),
            state,
            closed: AtomicBool::new(false),
        }
    }

    /// Join `group` and return a reader for the partitions assigned to it.
    pub fn reader(&self, group: impl Into<String>, fetch: FetchBounds) -> MemoryReader {
        let group = group.into();
        let member = {
            let mut state = self.lock();
            let member = state.next_member_id;
            state.next_member_id += 1;
            state.members.entry(group.clone()).or_default().push(member);
            member
        };
        self.inner.changed.notify_waiters();
        debug!(group, member, "Member joined group");

        MemoryReader {
            log: self.clone(),
            group,
            member,
            fetch,
            positions: HashMap::new(),
            buffer: VecDeque::new(),
            closed: false,
        }
    }

    /// Every record, ordered by partition then offset.
    pub fn records(&self) -> Vec<Record> {
        self.lock().partitions.iter().flatten().cloned().collect()
    }

    /// Next offset `group` will read from `partition`, if it ever committed.
    pub fn committed_offset(&self, group: &str, partition: u32) -> Option<u64> {
        self.lock()
            .committed
            .get(&(group.to_string(), partition))
            .copied()
    }

    /// Make the next publish through any writer fail with `error`.
    pub fn fail_next_publish(&self, error: PublishError) {
        self.lock().publish_failures.push_back(error);
    }

    /// Make the next ping through any writer fail with `error`.
    pub fn fail_next_ping(&self, error: PublishError) {
        self.lock().ping_failures.push_back(error);
    }

    /// Make the next fetch through any reader fail with `error`.
    pub fn fail_next_read(&self, error: ReadError) {
        self.lock().read_failures.push_back(error);
    }

    fn leave(&self, group: &str, member: u64) {
        {
            let mut state = self.lock();
            if let Some(members) = state.members.get_mut(group) {
                members.retain(|m| *m != member);
            }
        }
        self.inner.changed.notify_waiters();
        debug!(group, member, "Member left group");
    }
}

/// [`LogWriter`] over a [`MemoryLog`].
///
/// Tracks connection state like a broker-backed writer: a retryable
/// injected failure marks it disconnected until a publish or ping succeeds.
pub struct MemoryWriter {
    log: MemoryLog,
    balancer: Balancer,
    state: ConnectionState,
    closed: AtomicBool,
}

#[async_trait]
impl LogWriter for MemoryWriter {
    async fn publish(
        &self,
        key: Bytes,
        value: Bytes,
        _deadline: Duration,
    ) -> Result<(), PublishError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PublishError::Closed);
        }

        {
            let mut state = self.log.lock();
            if let Some(error) = state.publish_failures.pop_front() {
                if error.is_retryable() {
                    self.state.record_failure();
                }
                return Err(error);
            }

            let partition = self.balancer.select(&key, value.len());
            let Some(records) = state.partitions.get_mut(partition as usize) else {
                return Err(PublishError::InvalidRecord(format!(
                    "partition {partition} does not exist"
                )));
            };
            records.push(Record {
                partition,
                offset: records.len() as u64,
                key,
                value,
                timestamp: Utc::now(),
            });
        }

        self.state.set_connected(true);
        self.log.inner.changed.notify_waiters();
        Ok(())
    }

    async fn ping(&self) -> Result<(), PublishError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PublishError::Closed);
        }

        let failure = self.log.lock().ping_failures.pop_front();
        match failure {
            Some(error) => {
                self.state.record_failure();
                Err(error)
            }
            None => {
                self.state.set_connected(true);
                Ok(())
            }
        }
    }

    async fn close(&self) -> Result<(), PublishError> {
        self.closed.store(true, Ordering::SeqCst);
        self.state.set_connected(false);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.state.is_connected()
    }
}

/// [`LogReader`] over a [`MemoryLog`], bound to one group member.
pub struct MemoryReader {
    log: MemoryLog,
    group: String,
    member: u64,
    fetch: FetchBounds,
    /// Next offset to fetch, per currently assigned partition
    positions: HashMap<u32, u64>,
    buffer: VecDeque<Record>,
    closed: bool,
}

impl MemoryReader {
    /// Partitions currently assigned to this member.
    pub fn assignment(&self) -> Vec<u32> {
        self.log.lock().assignment(&self.group, self.member)
    }

    /// Move records from assigned partitions into the buffer until
    /// `buffered + fetched` would exceed `max_bytes`.
    ///
    /// Returns the bytes fetched and whether the byte budget stopped the
    /// fetch. An empty buffer always takes one record so large records flow.
    fn fetch_once(&mut self, buffered: usize) -> (usize, bool) {
        let log = self.log.clone();
        let state = log.lock();
        let assigned = state.assignment(&self.group, self.member);

        // Revoked partitions restart from the group's committed offset if
        // they are ever assigned back.
        self.positions.retain(|p, _| assigned.contains(p));

        let mut fetched = 0usize;
        for partition in assigned {
            let start = *self.positions.entry(partition).or_insert_with(|| {
                state
                    .committed
                    .get(&(self.group.clone(), partition))
                    .copied()
                    .unwrap_or(0)
            });
            let Some(records) = state.partitions.get(partition as usize) else {
                continue;
            };
            let mut next = start;
            for record in records.iter().skip(start as usize) {
                let total = buffered + fetched;
                if total > 0 && total + record.size() > self.fetch.max_bytes {
                    self.positions.insert(partition, next);
                    return (fetched, true);
                }
                fetched += record.size();
                next += 1;
                self.buffer.push_back(record.clone());
            }
            self.positions.insert(partition, next);
        }
        (fetched, false)
    }
}

#[async_trait]
impl LogReader for MemoryReader {
    async fn next(&mut self) -> Result<Option<Record>, ReadError> {
        if self.closed {
            return Err(ReadError::Closed);
        }
        if let Some(record) = self.buffer.pop_front() {
            return Ok(Some(record));
        }
        if let Some(error) = self.log.lock().read_failures.pop_front() {
            return Err(error);
        }

        let log = self.log.clone();
        let deadline = Instant::now() + self.fetch.max_wait;
        let mut fetched = 0usize;
        loop {
            // Register before fetching so an append in between is not missed.
            let changed = log.inner.changed.notified();
            let (bytes, full) = self.fetch_once(fetched);
            fetched += bytes;
            if full || fetched >= self.fetch.min_bytes.max(1) || fetched >= self.fetch.max_bytes {
                break;
            }
            if timeout_at(deadline, changed).await.is_err() {
                break;
            }
        }

        Ok(self.buffer.pop_front())
    }

    async fn commit(&mut self, record: &Record) -> Result<(), ReadError> {
        if self.closed {
            return Err(ReadError::Closed);
        }

        let mut state = self.log.lock();
        if record.partition as usize >= state.partitions.len() {
            return Err(ReadError::Commit {
                partition: record.partition,
                offset: record.offset,
                reason: "unknown partition".to_string(),
            });
        }

        let committed = state
            .committed
            .entry((self.group.clone(), record.partition))
            .or_insert(0);
        *committed = (*committed).max(record.offset + 1);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ReadError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.buffer.clear();
        self.log.leave(&self.group, self.member);
        Ok(())
    }
}

impl Drop for MemoryReader {
    fn drop(&mut self) {
        if !self.closed {
            self.log.leave(&self.group, self.member);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn eager() -> FetchBounds {
        FetchBounds::new(1, 1024 * 1024, Duration::from_millis(50))
    }

    async fn publish(writer: &MemoryWriter, key: &str, value: &str) {
        writer
            .publish(
                Bytes::copy_from_slice(key.as_bytes()),
                Bytes::copy_from_slice(value.as_bytes()),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_publish_assigns_sequential_offsets_per_partition() {
        let log = MemoryLog::new(1);
        let writer = log.writer(PartitionStrategy::LeastBytes);

        publish(&writer, "a", "1").await;
        publish(&writer, "b", "2").await;

        let offsets: Vec<u64> = log.records().iter().map(|r| r.offset).collect();
        assert_eq!(offsets, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_reader_returns_records_in_offset_order() {
        let log = MemoryLog::new(1);
        let writer = log.writer(PartitionStrategy::RoundRobin);
        for i in 0..5 {
            publish(&writer, "k", &format!("v{i}")).await;
        }

        let mut reader = log.reader("g", eager());
        for i in 0..5 {
            let record = reader.next().await.unwrap().unwrap();
            assert_eq!(record.offset, i);
            assert_eq!(record.value.as_ref(), format!("v{i}").as_bytes());
        }
    }

    #[tokio::test]
    async fn test_next_returns_none_after_max_wait() {
        let log = MemoryLog::new(2);
        let mut reader = log.reader("g", FetchBounds::new(1, 1024, Duration::from_millis(20)));

        let started = std::time::Instant::now();
        assert!(reader.next().await.unwrap().is_none());
        assert!(started.elapsed() >= Duration::from_millis(15));
    }

    #[tokio::test]
    async fn test_next_wakes_up_on_publish() {
        let log = MemoryLog::new(1);
        let mut reader = log.reader("g", FetchBounds::new(1, 1024, Duration::from_secs(5)));
        let writer = log.writer(PartitionStrategy::LeastBytes);

        let publisher = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publish(&writer, "k", "late").await;
        });

        let record = tokio::time::timeout(Duration::from_secs(2), reader.next())
            .await
            .expect("reader should wake on publish")
            .unwrap()
            .unwrap();
        assert_eq!(record.value.as_ref(), b"late");
        publisher.await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_respects_max_bytes() {
        let log = MemoryLog::new(1);
        let writer = log.writer(PartitionStrategy::LeastBytes);
        for _ in 0..4 {
            publish(&writer, "k", "0123456789").await; // 11 bytes each
        }

        let mut reader = log.reader("g", FetchBounds::new(1, 25, Duration::from_millis(20)));
        reader.next().await.unwrap().unwrap();

        // Two records fit in the first fetch; one is left in the buffer.
        assert_eq!(reader.buffer.len(), 1);
    }

    #[tokio::test]
    async fn test_max_bytes_holds_across_wakeups() {
        let log = MemoryLog::new(1);
        let writer = log.writer(PartitionStrategy::LeastBytes);
        publish(&writer, "k", "0123456789").await;

        // min_bytes is out of reach, so next keeps waking up for new records.
        let mut reader = log.reader("g", FetchBounds::new(1000, 25, Duration::from_secs(2)));
        let publisher = tokio::spawn(async move {
            for _ in 0..3 {
                tokio::time::sleep(Duration::from_millis(10)).await;
                publish(&writer, "k", "0123456789").await;
            }
        });

        let first = reader.next().await.unwrap().unwrap();
        publisher.await.unwrap();

        let buffered: usize = reader.buffer.iter().map(Record::size).sum();
        assert_eq!(reader.buffer.len(), 1);
        assert!(first.size() + buffered <= 25);
    }

    #[tokio::test]
    async fn test_oversized_record_is_still_delivered() {
        let log = MemoryLog::new(1);
        let writer = log.writer(PartitionStrategy::LeastBytes);
        publish(&writer, "k", &"x".repeat(100)).await;

        let mut reader = log.reader("g", FetchBounds::new(1, 10, Duration::from_millis(20)));
        assert!(reader.next().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_uncommitted_records_are_redelivered_to_next_member() {
        let log = MemoryLog::new(1);
        let writer = log.writer(PartitionStrategy::LeastBytes);
        publish(&writer, "k", "first").await;
        publish(&writer, "k", "second").await;

        let mut reader = log.reader("g", eager());
        let first = reader.next().await.unwrap().unwrap();
        reader.commit(&first).await.unwrap();
        let _second = reader.next().await.unwrap().unwrap();
        reader.close().await.unwrap();

        let mut replacement = log.reader("g", eager());
        let record = replacement.next().await.unwrap().unwrap();
        assert_eq!(record.value.as_ref(), b"second");
        assert_eq!(log.committed_offset("g", 0), Some(1));
    }

    #[tokio::test]
    async fn test_groups_track_offsets_independently() {
        let log = MemoryLog::new(1);
        let writer = log.writer(PartitionStrategy::LeastBytes);
        publish(&writer, "k", "v").await;

        let mut a = log.reader("a", eager());
        let record = a.next().await.unwrap().unwrap();
        a.commit(&record).await.unwrap();

        let mut b = log.reader("b", eager());
        assert_eq!(b.next().await.unwrap().unwrap().offset, 0);
        assert_eq!(log.committed_offset("b", 0), None);
    }

    #[tokio::test]
    async fn test_members_split_partitions_and_rebalance_on_leave() {
        let log = MemoryLog::new(3);
        let mut first = log.reader("g", eager());
        let second = log.reader("g", eager());

        assert_eq!(first.assignment(), vec![0, 2]);
        assert_eq!(second.assignment(), vec![1]);

        drop(second);
        assert_eq!(first.assignment(), vec![0, 1, 2]);
        first.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_commit_never_moves_offset_backwards() {
        let log = MemoryLog::new(1);
        let writer = log.writer(PartitionStrategy::LeastBytes);
        publish(&writer, "k", "a").await;
        publish(&writer, "k", "b").await;

        let mut reader = log.reader("g", eager());
        let a = reader.next().await.unwrap().unwrap();
        let b = reader.next().await.unwrap().unwrap();
        reader.commit(&b).await.unwrap();
        reader.commit(&a).await.unwrap();

        assert_eq!(log.committed_offset("g", 0), Some(2));
    }

    #[tokio::test]
    async fn test_injected_failures_surface_once() {
        let log = MemoryLog::new(1);
        let writer = log.writer(PartitionStrategy::LeastBytes);
        let mut reader = log.reader("g", FetchBounds::new(1, 1024, Duration::from_millis(10)));

        log.fail_next_publish(PublishError::Unavailable("down".into()));
        log.fail_next_read(ReadError::Unavailable("down".into()));

        assert!(matches!(
            writer
                .publish(Bytes::new(), Bytes::new(), Duration::from_secs(1))
                .await,
            Err(PublishError::Unavailable(_))
        ));
        assert!(matches!(reader.next().await, Err(ReadError::Unavailable(_))));

        publish(&writer, "k", "v").await;
        assert!(reader.next().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_ping_restores_connection_after_failed_publish() {
        let log = MemoryLog::new(1);
        let writer = log.writer(PartitionStrategy::LeastBytes);
        assert!(writer.is_connected());

        log.fail_next_publish(PublishError::Timeout(Duration::from_secs(1)));
        assert!(
            writer
                .publish(Bytes::new(), Bytes::new(), Duration::from_secs(1))
                .await
                .is_err()
        );
        assert!(!writer.is_connected());

        writer.ping().await.unwrap();
        assert!(writer.is_connected());

        log.fail_next_ping(PublishError::Unavailable("down".into()));
        assert!(writer.ping().await.is_err());
        assert!(!writer.is_connected());
    }

    #[tokio::test]
    async fn test_rejected_record_keeps_writer_connected() {
        let log = MemoryLog::new(1);
        let writer = log.writer(PartitionStrategy::LeastBytes);

        log.fail_next_publish(PublishError::InvalidRecord("key too long".into()));
        assert!(
            writer
                .publish(Bytes::new(), Bytes::new(), Duration::from_secs(1))
                .await
                .is_err()
        );
        assert!(writer.is_connected());
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_final() {
        let log = MemoryLog::new(1);
        let writer = log.writer(PartitionStrategy::LeastBytes);
        let mut reader = log.reader("g", eager());

        writer.close().await.unwrap();
        writer.close().await.unwrap();
        reader.close().await.unwrap();
        reader.close().await.unwrap();

        assert!(!writer.is_connected());
        assert_eq!(
            writer
                .publish(Bytes::new(), Bytes::new(), Duration::from_secs(1))
                .await,
            Err(PublishError::Closed)
        );
        assert_eq!(reader.next().await, Err(ReadError::Closed));
        assert_eq!(writer.ping().await, Err(PublishError::Closed));
    }
}
