//! Per-identifier running statistics
//!
//! The table lives in a sharded concurrent map so presentation code can take
//! snapshots while the pipeline keeps updating. Snapshots are not a single
//! point in time; entries updated during the walk may be newer than others.

use std::sync::Arc;

use can_frame::{CanId, Frame, Timestamp};
use dashmap::DashMap;
use serde::Serialize;

/// Running statistics for one identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupedStat {
    /// Identifier
    pub id: CanId,
    /// Number of sightings
    pub count: u64,
    /// Payload of the latest sighting
    pub last_data: Vec<u8>,
    /// Time of the latest sighting
    pub last_time: Timestamp,
}

/// Shared statistics table
///
/// Cloning yields another handle to the same table.
#[derive(Debug, Clone, Default)]
pub struct StatsAggregator {
    table: Arc<DashMap<CanId, GroupedStat>>,
}

impl StatsAggregator {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one sighting of `frame`
    pub fn update(&self, frame: &Frame) {
        self.table
            .entry(frame.id())
            .and_modify(|stat| {
                stat.count += 1;
                stat.last_data.clear();
                stat.last_data.extend_from_slice(frame.data());
                stat.last_time = frame.timestamp();
            })
            .or_insert_with(|| GroupedStat {
                id: frame.id(),
                count: 1,
                last_data: frame.data().to_vec(),
                last_time: frame.timestamp(),
            });
    }

    /// Statistics for one identifier
    pub fn get(&self, id: CanId) -> Option<GroupedStat> {
        self.table.get(&id).map(|entry| entry.value().clone())
    }

    /// All statistics, ordered by identifier ascending
    pub fn snapshot(&self) -> Vec<GroupedStat> {
        let mut stats: Vec<GroupedStat> = self
            .table
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        stats.sort_by_key(|s| s.id);
        stats
    }

    /// Number of distinct identifiers seen
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether nothing has been seen
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Drop every entry
    pub fn reset(&self) {
        self.table.clear();
    }
}
