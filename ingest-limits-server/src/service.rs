//! The limits service
//!
//! Ties the shared [`StreamMetadata`] store to this node's configuration and
//! partition assignment. Transports and the eviction task all work through a
//! single `Arc<LimitsService>`.

use crate::config::Config;
use crate::metrics::Metrics;
use crate::partitions::PartitionManager;
use crate::types::{
    AssignedPartitionsResponse, ExceedsLimitsRequest, ExceedsLimitsResponse, PartitionUsageEntry,
    RecordRequest, UsageResponse,
};
use ingest_limits::{
    MaxActiveStreams, RateWindow, Rejections, StreamMetadata, StreamUpdate, TenantUsage,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// Admission control over the partitions assigned to this node
pub struct LimitsService {
    store: Arc<StreamMetadata>,
    partitions: PartitionManager,
    metrics: Arc<Metrics>,
    policy: MaxActiveStreams,
    window: RateWindow,
    active_window: i64,
    num_partitions: u32,
}

impl LimitsService {
    /// Create the service and assign the configured partitions at `now`
    pub fn new(
        config: &Config,
        store: Arc<StreamMetadata>,
        metrics: Arc<Metrics>,
        now: i64,
    ) -> Self {
        let service = LimitsService {
            store,
            partitions: PartitionManager::new(),
            metrics,
            policy: MaxActiveStreams::new(config.limits.max_active_streams),
            window: RateWindow::new(
                config.limits.bucket_duration(),
                config.limits.rate_window(),
            ),
            active_window: duration_nanos(config.limits.active_window()),
            num_partitions: config.partitions.num_partitions,
        };
        service.assign_partitions(&config.partitions.assigned, now);
        service
    }

    pub fn store(&self) -> &Arc<StreamMetadata> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Streams last seen before this time are no longer active
    pub fn active_cutoff(&self, now: i64) -> i64 {
        now.saturating_sub(self.active_window)
    }

    pub fn num_partitions(&self) -> u32 {
        self.num_partitions
    }

    /// Partition a stream hash belongs to
    pub fn partition_for(&self, stream_hash: u64) -> i32 {
        (stream_hash % u64::from(self.num_partitions)) as i32
    }

    /// Check a tenant's streams against the active stream limit
    ///
    /// Accepted streams are recorded in the store. Streams on partitions this
    /// node does not own are skipped: they are neither stored nor rejected.
    ///
    /// Ownership is checked again after the write. A partition revoked in
    /// between has its metadata dropped here, since the revoking call may
    /// already have finished its own eviction.
    pub fn exceeds_limits(
        &self,
        request: &ExceedsLimitsRequest,
        now: i64,
    ) -> ExceedsLimitsResponse {
        let mut by_partition: BTreeMap<i32, Vec<StreamUpdate>> = BTreeMap::new();
        let mut skipped = 0usize;

        for entry in &request.streams {
            let partition = self.partition_for(entry.stream_hash);
            if !self.partitions.has(partition) {
                skipped += 1;
                continue;
            }
            by_partition.entry(partition).or_default().push(StreamUpdate::new(
                entry.stream_hash,
                entry.total_size(),
                now,
            ));
        }

        if skipped > 0 {
            tracing::debug!(
                tenant = %request.tenant,
                skipped,
                "Skipped streams on unassigned partitions"
            );
        }

        let mut rejections = Rejections::new();
        let accepted = self.store.store_cond(
            &request.tenant,
            &by_partition,
            self.active_cutoff(now),
            self.window.bounds(now),
            &self.policy,
            &mut rejections,
        );
        self.drop_revoked(by_partition.keys().copied());

        if !rejections.is_empty() {
            tracing::debug!(
                tenant = %request.tenant,
                rejected = rejections.len(),
                limit = self.policy.limit(),
                "Streams exceed the active stream limit"
            );
        }

        self.metrics.record_admission(
            request.streams.len() - skipped,
            rejections.len(),
            accepted,
        );

        ExceedsLimitsResponse {
            results: rejections.into_vec().into_iter().map(Into::into).collect(),
        }
    }

    /// Store a consumed record without checking limits
    ///
    /// Returns false if the record's partition is not assigned to this node.
    pub fn record(&self, request: &RecordRequest, now: i64) -> bool {
        if !self.partitions.has(request.partition) {
            self.metrics.record_write(false);
            return false;
        }

        let recorded_at = request.timestamp.unwrap_or(now);
        self.store.store(
            &request.tenant,
            request.partition,
            &StreamUpdate::new(request.stream_hash, request.size, recorded_at),
            self.window.bounds(recorded_at),
        );
        if self.drop_revoked([request.partition]) {
            self.metrics.record_write(false);
            return false;
        }
        self.metrics.record_write(true);
        true
    }

    /// Evict any of `written` that stopped being assigned during a write
    ///
    /// Returns true if anything was evicted.
    fn drop_revoked(&self, written: impl IntoIterator<Item = i32>) -> bool {
        let lost: Vec<i32> = written
            .into_iter()
            .filter(|p| !self.partitions.has(*p))
            .collect();
        if lost.is_empty() {
            return false;
        }
        tracing::debug!(partitions = ?lost, "Partitions revoked during write");
        self.store.evict_partitions(&lost);
        true
    }

    /// Active streams and ingestion rate of a tenant
    pub fn usage(&self, tenant: &str, now: i64) -> UsageResponse {
        let usage = TenantUsage::collect(
            &self.store,
            tenant,
            self.active_cutoff(now),
            self.window.bounds(now).cutoff,
        );

        UsageResponse {
            tenant: tenant.to_string(),
            active_streams: usage.active_streams,
            total_size: usage.total_size,
            rate: usage.window_bytes as f64 / self.window.window().as_secs_f64(),
            partitions: usage
                .partitions
                .iter()
                .map(|(partition, p)| PartitionUsageEntry {
                    partition: *partition,
                    active_streams: p.active_streams,
                    total_size: p.total_size,
                    window_bytes: p.window_bytes,
                })
                .collect(),
        }
    }

    pub fn assigned_partitions(&self) -> AssignedPartitionsResponse {
        AssignedPartitionsResponse {
            assigned_partitions: self.partitions.list(),
        }
    }

    /// Take ownership of partitions, returning the newly assigned ones
    pub fn assign_partitions(&self, partitions: &[i32], now: i64) -> Vec<i32> {
        let added = self.partitions.assign(partitions, now);
        self.metrics.update_assigned_partitions(self.partitions.len());

        if !added.is_empty() {
            tracing::info!(partitions = ?added, "Partitions assigned");
        }
        added
    }

    /// Give up partitions and drop their stream metadata
    pub fn revoke_partitions(&self, partitions: &[i32]) -> Vec<i32> {
        let revoked = self.partitions.revoke(partitions);
        if !revoked.is_empty() {
            self.store.evict_partitions(&revoked);
            tracing::info!(partitions = ?revoked, "Partitions revoked");
        }
        self.metrics.update_assigned_partitions(self.partitions.len());
        revoked
    }

    /// Remove streams that are no longer active at `now`
    pub fn evict_expired(&self, now: i64) -> HashMap<String, usize> {
        self.store.evict(self.active_cutoff(now))
    }
}

fn duration_nanos(d: Duration) -> i64 {
    i64::try_from(d.as_nanos()).unwrap_or(i64::MAX)
}
