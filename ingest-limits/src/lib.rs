//! # ingest-limits
//!
//! An in-memory, sharded store of per-tenant log stream metadata that enforces
//! an active-stream limit at admission time.
//!
//! ## Overview
//!
//! For every tenant the store tracks, per source partition, the streams it has
//! seen recently:
//! - **Last seen time**: decides whether a stream still holds an active slot
//! - **Total size**: cumulative bytes since the stream (re)appeared
//! - **Rate buckets**: fixed-duration byte counters over a sliding window
//!
//! Admission runs inline under the tenant's shard lock: new or expired
//! streams are offered to a caller-supplied [`AdmissionPolicy`], while streams
//! that are already active are always accepted.
//!
//! ## Quick Start
//!
//! ```
//! use ingest_limits::{
//!     MaxActiveStreams, RateWindow, Rejections, StreamMetadata, StreamUpdate, nanos,
//! };
//! use std::collections::BTreeMap;
//! use std::time::{Duration, SystemTime};
//!
//! let store = StreamMetadata::with_shard_count(16);
//! let window = RateWindow::new(Duration::from_secs(60), Duration::from_secs(300));
//!
//! let now = nanos(SystemTime::now());
//! let active_cutoff = now - Duration::from_secs(3600).as_nanos() as i64;
//!
//! // Two new streams on partition 0, limit of one active stream
//! let mut batch = BTreeMap::new();
//! batch.insert(0, vec![StreamUpdate::new(0xa, 512, now), StreamUpdate::new(0xb, 256, now)]);
//!
//! let mut rejections = Rejections::new();
//! let accepted = store.store_cond(
//!     "tenant-1",
//!     &batch,
//!     active_cutoff,
//!     window.bounds(now),
//!     &MaxActiveStreams::new(1),
//!     &mut rejections,
//! );
//!
//! assert_eq!(accepted, 512);
//! assert_eq!(rejections.len(), 1);
//! ```
//!
//! ## Housekeeping
//!
//! The store never spawns background work. Callers drive eviction:
//!
//! ```
//! use ingest_limits::StreamMetadata;
//!
//! let store = StreamMetadata::with_shard_count(4);
//!
//! // Drop streams not seen since the cutoff
//! let evicted = store.evict(1_000);
//! for (tenant, count) in &evicted {
//!     println!("evicted {count} streams of {tenant}");
//! }
//!
//! // Forget partitions this node no longer owns
//! store.evict_partitions(&[3, 4]);
//! ```
//!
//! ## Thread Safety
//!
//! [`StreamMetadata`] is `Sync`; share it with an `Arc`. Table-wide passes
//! lock one shard at a time and are not atomic snapshots.
//!
//! ## Features
//!
//! - `ahash` (default): Use AHash for the internal maps

pub mod core;

pub use core::{
    AdmissionPolicy, BucketBounds, MaxActiveStreams, PartitionUsage, RateBucket, RateWindow,
    Reason, RejectedStream, Rejections, Stream, StreamMetadata, StreamMetadataBuilder,
    StreamUpdate, TenantUsage, nanos,
};
