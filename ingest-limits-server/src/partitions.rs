//! Partitions assigned to this node
//!
//! The node only enforces limits for streams on partitions it owns. The
//! manager records when each partition was assigned so it can be reported
//! back to clients; revoking partitions is the caller's cue to drop their
//! stream metadata.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

/// Assigned partition -> assignment time (Unix nanoseconds)
#[derive(Debug, Default)]
pub struct PartitionManager {
    partitions: RwLock<BTreeMap<i32, i64>>,
}

impl PartitionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign partitions at time `now`, returning the ones that were newly added
    ///
    /// Partitions that are already assigned keep their first assignment time.
    pub fn assign(&self, partitions: &[i32], now: i64) -> Vec<i32> {
        let mut assigned = self.partitions.write();
        partitions
            .iter()
            .filter(|p| match assigned.entry(**p) {
                Entry::Vacant(slot) => {
                    slot.insert(now);
                    true
                }
                Entry::Occupied(_) => false,
            })
            .copied()
            .collect()
    }

    /// Revoke partitions, returning the ones that were actually assigned
    pub fn revoke(&self, partitions: &[i32]) -> Vec<i32> {
        let mut assigned = self.partitions.write();
        partitions
            .iter()
            .filter(|p| assigned.remove(*p).is_some())
            .copied()
            .collect()
    }

    pub fn has(&self, partition: i32) -> bool {
        self.partitions.read().contains_key(&partition)
    }

    /// Snapshot of all assigned partitions and their assignment times
    pub fn list(&self) -> BTreeMap<i32, i64> {
        self.partitions.read().clone()
    }

    pub fn len(&self) -> usize {
        self.partitions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.read().is_empty()
    }
}
