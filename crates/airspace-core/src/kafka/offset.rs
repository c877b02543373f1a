//! Offset tracking for Kafka partitions.
//!
//! The consumer records the highest offset it has consumed per partition,
//! including messages it dropped as malformed, and commits only what a
//! successful flush has made durable.

use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};

/// Tracks consumed and committed offsets per partition.
pub struct OffsetTracker {
    /// Highest consumed offset per (topic, partition)
    current_offsets: DashMap<(String, i32), AtomicI64>,

    /// Last committed offset per partition
    committed_offsets: DashMap<(String, i32), AtomicI64>,
}

impl OffsetTracker {
    pub fn new() -> Self {
        Self {
            current_offsets: DashMap::new(),
            committed_offsets: DashMap::new(),
        }
    }

    /// Record a consumed offset. Lower offsets than the current one are ignored.
    pub fn update_current(&self, topic: &str, partition: i32, offset: i64) {
        let key = (topic.to_string(), partition);
        self.current_offsets
            .entry(key)
            .and_modify(|v| {
                v.fetch_max(offset, Ordering::SeqCst);
            })
            .or_insert_with(|| AtomicI64::new(offset));
    }

    pub fn get_current(&self, topic: &str, partition: i32) -> Option<i64> {
        let key = (topic.to_string(), partition);
        self.current_offsets
            .get(&key)
            .map(|v| v.load(Ordering::SeqCst))
    }

    pub fn mark_committed(&self, topic: &str, partition: i32, offset: i64) {
        let key = (topic.to_string(), partition);
        self.committed_offsets
            .entry(key)
            .and_modify(|v| v.store(offset, Ordering::SeqCst))
            .or_insert_with(|| AtomicI64::new(offset));
    }

    /// Mark a whole commit as done.
    pub fn mark_all_committed(&self, offsets: &[(String, i32, i64)]) {
        for (topic, partition, offset) in offsets {
            self.mark_committed(topic, *partition, *offset);
        }
    }

    pub fn get_committed(&self, topic: &str, partition: i32) -> Option<i64> {
        let key = (topic.to_string(), partition);
        self.committed_offsets
            .get(&key)
            .map(|v| v.load(Ordering::SeqCst))
    }

    /// Partitions whose consumed offset is ahead of the committed one.
    ///
    /// Sorted by topic and partition.
    pub fn pending_commits(&self) -> Vec<(String, i32, i64)> {
        let mut pending: Vec<_> = self
            .current_offsets
            .iter()
            .filter_map(|entry| {
                let (topic, partition) = entry.key();
                let current = entry.value().load(Ordering::SeqCst);
                match self.get_committed(topic, *partition) {
                    Some(committed) if committed >= current => None,
                    _ => Some((topic.clone(), *partition, current)),
                }
            })
            .collect();
        pending.sort();
        pending
    }
}

impl Default for OffsetTracker {
    fn default() -> Self {
        Self::new()
    }
}
