//! Client-side partition selection.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// How the writer picks a partition for each record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PartitionStrategy {
    /// Partition that has been routed the fewest bytes so far
    #[default]
    LeastBytes,
    /// Stable hash of the record key
    Hash,
    /// Cycle through partitions in order
    RoundRobin,
}

impl FromStr for PartitionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "least_bytes" => Ok(Self::LeastBytes),
            "hash" => Ok(Self::Hash),
            "round_robin" => Ok(Self::RoundRobin),
            other => Err(format!(
                "unknown partition strategy '{other}' (expected least_bytes, hash or round_robin)"
            )),
        }
    }
}

impl fmt::Display for PartitionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LeastBytes => write!(f, "least_bytes"),
            Self::Hash => write!(f, "hash"),
            Self::RoundRobin => write!(f, "round_robin"),
        }
    }
}

/// Picks target partitions for a topic with a fixed partition count.
///
/// Thread-safe; concurrent callers may occasionally pick the same
/// least-loaded partition, which only skews the distribution slightly.
#[derive(Debug)]
pub struct Balancer {
    strategy: PartitionStrategy,
    routed_bytes: Vec<AtomicU64>,
    cursor: AtomicU32,
}

impl Balancer {
    /// Create a balancer over `partitions` partitions (at least one).
    pub fn new(strategy: PartitionStrategy, partitions: u32) -> Self {
        let partitions = partitions.max(1);
        Self {
            strategy,
            routed_bytes: (0..partitions).map(|_| AtomicU64::new(0)).collect(),
            cursor: AtomicU32::new(0),
        }
    }

    pub fn partitions(&self) -> u32 {
        self.routed_bytes.len() as u32
    }

    /// Choose a partition for a record of `size` bytes with the given key.
    ///
    /// Returns a 0-based partition index and accounts `size` against it.
    pub fn select(&self, key: &[u8], size: usize) -> u32 {
        let partitions = self.partitions();
        let partition = match self.strategy {
            PartitionStrategy::LeastBytes => self.least_loaded(),
            PartitionStrategy::Hash => fnv1a(key) % partitions,
            PartitionStrategy::RoundRobin => {
                self.cursor.fetch_add(1, Ordering::Relaxed) % partitions
            }
        };

        if let Some(counter) = self.routed_bytes.get(partition as usize) {
            counter.fetch_add(size as u64, Ordering::Relaxed);
        }
        partition
    }

    /// Bytes routed to `partition` so far.
    pub fn routed_bytes(&self, partition: u32) -> u64 {
        self.routed_bytes
            .get(partition as usize)
            .map_or(0, |counter| counter.load(Ordering::Relaxed))
    }

    // Ties go to the lowest partition index.
    fn least_loaded(&self) -> u32 {
        self.routed_bytes
            .iter()
            .enumerate()
            .min_by_key(|(index, counter)| (counter.load(Ordering::Relaxed), *index))
            .map_or(0, |(index, _)| index as u32)
    }
}

/// 32-bit FNV-1a.
fn fnv1a(key: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    key.iter().fold(OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(PRIME)
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parsing() {
        assert_eq!(
            "least_bytes".parse::<PartitionStrategy>().unwrap(),
            PartitionStrategy::LeastBytes
        );
        assert_eq!("HASH".parse::<PartitionStrategy>().unwrap(), PartitionStrategy::Hash);
        assert_eq!(
            " round_robin ".parse::<PartitionStrategy>().unwrap(),
            PartitionStrategy::RoundRobin
        );
        assert!("random".parse::<PartitionStrategy>().is_err());
    }

    #[test]
    fn test_strategy_display_matches_parse() {
        for strategy in [
            PartitionStrategy::LeastBytes,
            PartitionStrategy::Hash,
            PartitionStrategy::RoundRobin,
        ] {
            assert_eq!(strategy.to_string().parse::<PartitionStrategy>().unwrap(), strategy);
        }
    }

    #[test]
    fn test_least_bytes_fills_emptiest_partition() {
        let balancer = Balancer::new(PartitionStrategy::LeastBytes, 3);

        assert_eq!(balancer.select(b"a", 100), 0);
        assert_eq!(balancer.select(b"b", 10), 1);
        assert_eq!(balancer.select(b"c", 10), 2);
        // Partitions 1 and 2 tie at 10 bytes; the lower index wins.
        assert_eq!(balancer.select(b"d", 50), 1);
        assert_eq!(balancer.select(b"e", 1), 2);

        assert_eq!(balancer.routed_bytes(0), 100);
        assert_eq!(balancer.routed_bytes(1), 60);
        assert_eq!(balancer.routed_bytes(2), 11);
    }

    #[test]
    fn test_least_bytes_spreads_equal_records_evenly() {
        let balancer = Balancer::new(PartitionStrategy::LeastBytes, 3);
        let mut counts = [0u32; 3];

        for _ in 0..30 {
            let partition = balancer.select(b"key", 64);
            counts[partition as usize] += 1;
        }

        assert_eq!(counts, [10, 10, 10]);
    }

    #[test]
    fn test_hash_is_stable_per_key() {
        let balancer = Balancer::new(PartitionStrategy::Hash, 8);
        let first = balancer.select(b"550e8400-e29b-41d4-a716-446655440000", 10);

        for _ in 0..10 {
            assert_eq!(
                balancer.select(b"550e8400-e29b-41d4-a716-446655440000", 10),
                first
            );
        }
        assert!(first < 8);
    }

    #[test]
    fn test_fnv1a_reference_values() {
        assert_eq!(fnv1a(b""), 0x811c_9dc5);
        assert_eq!(fnv1a(b"a"), 0xe40c_292c);
        assert_eq!(fnv1a(b"foobar"), 0xbf9c_f968);
    }

    #[test]
    fn test_round_robin_cycles() {
        let balancer = Balancer::new(PartitionStrategy::RoundRobin, 3);
        let picks: Vec<u32> = (0..7).map(|_| balancer.select(b"", 1)).collect();

        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_zero_partitions_is_treated_as_one() {
        let balancer = Balancer::new(PartitionStrategy::Hash, 0);

        assert_eq!(balancer.partitions(), 1);
        assert_eq!(balancer.select(b"anything", 5), 0);
    }
}
