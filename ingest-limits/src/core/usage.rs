//! Per-tenant usage summaries built on [`StreamMetadata::usage`]

use std::collections::BTreeMap;

use super::store::StreamMetadata;

/// Usage of one partition of a tenant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionUsage {
    /// Streams seen at or after the active cutoff
    pub active_streams: u64,
    /// Cumulative bytes of the active streams
    pub total_size: u64,
    /// Bytes of the active streams still inside the rate window
    pub window_bytes: u64,
}

/// Usage of a tenant across all of its partitions on this node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantUsage {
    pub active_streams: u64,
    pub total_size: u64,
    pub window_bytes: u64,
    pub partitions: BTreeMap<i32, PartitionUsage>,
}

impl TenantUsage {
    /// Summarise `tenant`'s active streams
    ///
    /// Streams last seen before `cutoff` are skipped; bucket bytes are counted
    /// when the bucket starts at or after `rate_cutoff`.
    pub fn collect(store: &StreamMetadata, tenant: &str, cutoff: i64, rate_cutoff: i64) -> Self {
        let mut usage = TenantUsage::default();

        store.usage(tenant, |partition, stream| {
            if !stream.is_active(cutoff) {
                return;
            }
            let window_bytes = stream.window_bytes(rate_cutoff);

            let entry = usage.partitions.entry(partition).or_default();
            entry.active_streams += 1;
            entry.total_size += stream.total_size;
            entry.window_bytes += window_bytes;

            usage.active_streams += 1;
            usage.total_size += stream.total_size;
            usage.window_bytes += window_bytes;
        });

        usage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rate::BucketBounds;
    use crate::core::stream::StreamUpdate;

    #[test]
    fn test_collect_skips_expired_streams() {
        let store = StreamMetadata::with_shard_count(2);
        let at = |t: i64| BucketBounds {
            start: t,
            cutoff: t - 60,
        };

        store.store("t", 0, &StreamUpdate::new(1, 10, 150), at(150));
        store.store("t", 0, &StreamUpdate::new(1, 5, 160), at(160));
        store.store("t", 1, &StreamUpdate::new(2, 20, 150), at(150));
        store.store("t", 1, &StreamUpdate::new(3, 99, 20), at(20));
        store.store("other", 0, &StreamUpdate::new(4, 7, 150), at(150));

        let usage = TenantUsage::collect(&store, "t", 100, 155);

        assert_eq!(usage.active_streams, 2);
        assert_eq!(usage.total_size, 35);
        // Only the bucket at 160 starts inside the window
        assert_eq!(usage.window_bytes, 5);
        assert_eq!(
            usage.partitions.get(&0),
            Some(&PartitionUsage {
                active_streams: 1,
                total_size: 15,
                window_bytes: 5,
            })
        );
        assert_eq!(usage.partitions.get(&1).map(|p| p.active_streams), Some(1));
    }

    #[test]
    fn test_collect_unknown_tenant() {
        let store = StreamMetadata::with_shard_count(1);
        assert_eq!(
            TenantUsage::collect(&store, "missing", 0, 0),
            TenantUsage::default()
        );
    }
}
