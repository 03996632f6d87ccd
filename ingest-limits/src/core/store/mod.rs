//! Sharded stream metadata store
//!
//! The store keeps a `tenant -> partition -> stream hash -> Stream` hierarchy
//! split across a fixed number of shards. Each shard owns a disjoint set of
//! tenants and is guarded by its own reader/writer lock.
//!
//! # Locking
//!
//! - Tenant-scoped operations ([`usage`](StreamMetadata::usage),
//!   [`store`](StreamMetadata::store), [`store_cond`](StreamMetadata::store_cond))
//!   take exactly one shard lock.
//! - Table-wide operations ([`all`](StreamMetadata::all),
//!   [`evict`](StreamMetadata::evict),
//!   [`evict_partitions`](StreamMetadata::evict_partitions)) lock the shards
//!   one after another and release each before taking the next.
//!
//! No call ever holds two shard locks, so there is no lock ordering to get
//! wrong. The price is that a table-wide pass is not a snapshot: writers may
//! change a shard the pass has not reached yet.

use std::collections::{BTreeMap, HashMap};

use super::policy::{AdmissionPolicy, Rejections};
use super::rate::BucketBounds;
use super::stream::{Stream, StreamUpdate};

mod shard;

use shard::{Shard, fnv1a};

#[cfg(test)]
mod tests;

// Configuration constants
const DEFAULT_TENANT_CAPACITY: usize = 64;
const SHARDS_PER_CPU: usize = 4;

/// Sharded, concurrently accessible stream metadata
///
/// Construct one instance and share it (e.g. behind an `Arc`) between the
/// admission path, the ingest path and the eviction task.
///
/// # Example
///
/// ```
/// use ingest_limits::{MaxActiveStreams, Rejections, StreamMetadata, StreamUpdate, BucketBounds};
/// use std::collections::BTreeMap;
///
/// let store = StreamMetadata::with_shard_count(1);
/// let bounds = BucketBounds { start: 150, cutoff: 90 };
///
/// let mut batch = BTreeMap::new();
/// batch.insert(0, vec![
///     StreamUpdate::new(1, 10, 150),
///     StreamUpdate::new(2, 20, 150),
///     StreamUpdate::new(3, 30, 150),
/// ]);
///
/// let mut rejections = Rejections::new();
/// let accepted = store.store_cond("t", &batch, 100, bounds, &MaxActiveStreams::new(2), &mut rejections);
///
/// assert_eq!(accepted, 30);
/// assert_eq!(rejections.len(), 1);
/// ```
pub struct StreamMetadata {
    shards: Box<[Shard]>,
}

/// Builder for configuring a [`StreamMetadata`] store
///
/// # Example
///
/// ```
/// use ingest_limits::StreamMetadata;
///
/// let store = StreamMetadata::builder()
///     .shards(32)
///     .capacity(1_000)
///     .build();
/// assert_eq!(store.shard_count(), 32);
/// ```
pub struct StreamMetadataBuilder {
    shards: usize,
    capacity: usize,
}

impl StreamMetadata {
    /// Create a store with four shards per available CPU
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a store with a fixed number of shards
    ///
    /// # Panics
    ///
    /// Panics if `shard_count` is zero.
    pub fn with_shard_count(shard_count: usize) -> Self {
        Self::builder().shards(shard_count).build()
    }

    pub fn builder() -> StreamMetadataBuilder {
        StreamMetadataBuilder::default()
    }

    fn with_config(shard_count: usize, capacity: usize) -> Self {
        assert!(shard_count > 0, "Shard count must be greater than 0");

        let shards = (0..shard_count)
            .map(|_| Shard::with_capacity(capacity))
            .collect();

        StreamMetadata { shards }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Index of the shard owning `tenant`
    #[inline]
    fn shard_index(&self, tenant: &str) -> usize {
        fnv1a(tenant) as usize % self.shards.len()
    }

    #[inline]
    fn shard(&self, tenant: &str) -> &Shard {
        &self.shards[self.shard_index(tenant)]
    }

    /// Number of tenants currently tracked, summed shard by shard
    pub fn tenant_len(&self) -> usize {
        self.shards.iter().map(|s| s.tenants.read().len()).sum()
    }

    /// Number of streams currently tracked, summed shard by shard
    pub fn stream_len(&self) -> usize {
        let mut count = 0;
        self.all(|_, _, _| count += 1);
        count
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.tenants.read().is_empty())
    }

    /// Visit every stream of every tenant
    ///
    /// Shards are read-locked one at a time.
    pub fn all<F>(&self, mut f: F)
    where
        F: FnMut(&str, i32, &Stream),
    {
        for shard in self.shards.iter() {
            let tenants = shard.tenants.read();
            for (tenant, partitions) in tenants.iter() {
                for (partition, streams) in partitions.iter() {
                    for stream in streams.values() {
                        f(tenant.as_str(), *partition, stream);
                    }
                }
            }
        }
    }

    /// Visit every stream of a single tenant, partition by partition
    pub fn usage<F>(&self, tenant: &str, mut f: F)
    where
        F: FnMut(i32, &Stream),
    {
        let tenants = self.shard(tenant).tenants.read();
        let Some(partitions) = tenants.get(tenant) else {
            return;
        };
        for (partition, streams) in partitions.iter() {
            for stream in streams.values() {
                f(*partition, stream);
            }
        }
    }

    /// Store a tenant's batch of streams, gating new stream slots with `policy`
    ///
    /// For each partition, streams last seen at or after `cutoff` count as
    /// active. A candidate that is unknown or expired bumps the running count
    /// of new streams and is offered to `policy` with `active + new`. The
    /// bump is kept even when the policy refuses, so later candidates in the
    /// batch see the slot as taken. Candidates that are already active are
    /// merged without asking the policy.
    ///
    /// The whole batch runs under the tenant's shard lock. Returns the sum of
    /// the sizes of accepted candidates; refusals are reported only through
    /// whatever the policy writes to `rejections`.
    pub fn store_cond<P>(
        &self,
        tenant: &str,
        streams: &BTreeMap<i32, Vec<StreamUpdate>>,
        cutoff: i64,
        bounds: BucketBounds,
        policy: &P,
        rejections: &mut Rejections,
    ) -> u64
    where
        P: AdmissionPolicy + ?Sized,
    {
        let mut tenants = self.shard(tenant).tenants.write();
        let partitions = tenants.entry(tenant.to_owned()).or_default();

        let mut accepted: u64 = 0;
        for (partition, updates) in streams {
            let stored = partitions.entry(*partition).or_default();

            let active = stored.values().filter(|s| s.is_active(cutoff)).count() as u64;
            let mut new_streams = 0u64;

            for update in updates {
                match stored.get_mut(&update.hash) {
                    Some(stream) if stream.is_active(cutoff) => {
                        stream.merge(update.size, update.recorded_at, bounds);
                    }
                    existing => {
                        // Counted before asking so refused candidates still hold a slot
                        new_streams += 1;
                        if !policy.admit(active + new_streams, update, rejections) {
                            continue;
                        }

                        match existing {
                            Some(stream) => {
                                stream.reset(update.recorded_at);
                                stream.merge(update.size, update.recorded_at, bounds);
                            }
                            None => {
                                stored.insert(
                                    update.hash,
                                    Stream::new(
                                        update.hash,
                                        update.size,
                                        update.recorded_at,
                                        bounds.start,
                                    ),
                                );
                            }
                        }
                    }
                }

                accepted = accepted.saturating_add(update.size);
            }

            if stored.is_empty() {
                partitions.remove(partition);
            }
        }

        if partitions.is_empty() {
            tenants.remove(tenant);
        }

        accepted
    }

    /// Record a write for a stream without any admission check
    pub fn store(&self, tenant: &str, partition: i32, update: &StreamUpdate, bounds: BucketBounds) {
        let mut tenants = self.shard(tenant).tenants.write();
        let streams = tenants
            .entry(tenant.to_owned())
            .or_default()
            .entry(partition)
            .or_default();

        match streams.get_mut(&update.hash) {
            Some(stream) => stream.merge(update.size, update.recorded_at, bounds),
            None => {
                streams.insert(
                    update.hash,
                    Stream::new(update.hash, update.size, update.recorded_at, bounds.start),
                );
            }
        }
    }

    /// Remove every stream last seen before `cutoff`
    ///
    /// Partitions and tenants left without streams are dropped as well.
    /// Returns the number of removed streams per tenant.
    pub fn evict(&self, cutoff: i64) -> HashMap<String, usize> {
        let mut evicted: HashMap<String, usize> = HashMap::new();

        for shard in self.shards.iter() {
            let mut tenants = shard.tenants.write();
            tenants.retain(|tenant, partitions| {
                partitions.retain(|_, streams| {
                    let before = streams.len();
                    streams.retain(|_, stream| stream.is_active(cutoff));

                    let removed = before - streams.len();
                    if removed > 0 {
                        *evicted.entry(tenant.clone()).or_default() += removed;
                    }
                    !streams.is_empty()
                });
                !partitions.is_empty()
            });
        }

        evicted
    }

    /// Remove the given partitions from every tenant
    ///
    /// Tenants left without partitions are dropped.
    pub fn evict_partitions(&self, partitions: &[i32]) {
        if partitions.is_empty() {
            return;
        }

        for shard in self.shards.iter() {
            let mut tenants = shard.tenants.write();
            tenants.retain(|_, owned| {
                for partition in partitions {
                    owned.remove(partition);
                }
                !owned.is_empty()
            });
        }
    }
}

impl Default for StreamMetadata {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for StreamMetadataBuilder {
    fn default() -> Self {
        let cpu_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        Self {
            shards: cpu_count * SHARDS_PER_CPU,
            capacity: DEFAULT_TENANT_CAPACITY,
        }
    }
}

impl StreamMetadataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of shards
    ///
    /// Fixed for the lifetime of the store. More shards mean less contention
    /// between unrelated tenants.
    pub fn shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    /// Set the expected number of tenants per shard
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Build the store
    ///
    /// # Panics
    ///
    /// Panics if the shard count is zero.
    pub fn build(self) -> StreamMetadata {
        StreamMetadata::with_config(self.shards, self.capacity)
    }
}
