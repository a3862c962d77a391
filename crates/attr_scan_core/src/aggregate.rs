use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, PoisonError};

use crate::record::Record;

/// Append-only store of matched records shared by all partition tasks.
///
/// Records are kept per partition in page arrival order, so the flushed
/// order is (partition index, arrival order) no matter how the tasks
/// interleaved.
#[derive(Debug, Default)]
pub struct Aggregator {
    partitions: Mutex<BTreeMap<usize, Vec<Record>>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedRecords {
    pub records: Vec<Record>,
    pub duplicates_dropped: usize,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, partition: usize, records: Vec<Record>) {
        if records.is_empty() {
            return;
        }
        self.partitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(partition)
            .or_default()
            .extend(records);
    }

    pub fn len(&self) -> usize {
        self.partitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }

    /// Records held so far for one partition.
    pub fn partition_len(&self, partition: usize) -> usize {
        self.partitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&partition)
            .map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drains the store in deterministic order. A key seen in more than one
    /// place (possible when backend boundaries drift mid-scan) is kept only
    /// at its first position.
    pub fn flush(&self) -> AggregatedRecords {
        let partitions =
            std::mem::take(&mut *self.partitions.lock().unwrap_or_else(PoisonError::into_inner));

        let mut seen = HashSet::new();
        let mut records = Vec::new();
        let mut duplicates_dropped = 0usize;
        for record in partitions.into_values().flatten() {
            if seen.insert(record.key) {
                records.push(record);
            } else {
                duplicates_dropped += 1;
            }
        }

        AggregatedRecords {
            records,
            duplicates_dropped,
        }
    }
}
