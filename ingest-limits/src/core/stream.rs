//! Per-stream metadata
//!
//! A [`Stream`] carries the minimal information needed to count a tenant's
//! active streams and approximate their ingestion rate.

use super::rate::BucketBounds;

/// Bytes received during one fixed-duration interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateBucket {
    /// Start of the interval (Unix nanoseconds)
    pub timestamp: i64,
    /// Bytes received during the interval
    pub size: u64,
}

/// Metadata for a single stream of a tenant partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stream {
    /// Hash of the stream's grouping key
    pub hash: u64,
    /// Time of the most recent accepted record
    pub last_seen_at: i64,
    /// Bytes accepted since the stream (re)appeared
    pub total_size: u64,
    /// Byte buckets within the rate window, oldest first
    pub rate_buckets: Vec<RateBucket>,
}

/// A candidate write for a stream
///
/// Produced by the ingest path for every record (or pre-aggregated group of
/// records) and handed to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamUpdate {
    pub hash: u64,
    pub size: u64,
    pub recorded_at: i64,
}

impl StreamUpdate {
    pub fn new(hash: u64, size: u64, recorded_at: i64) -> Self {
        StreamUpdate {
            hash,
            size,
            recorded_at,
        }
    }
}

impl Stream {
    /// Creates a stream with a single bucket at `bucket_start`
    pub fn new(hash: u64, size: u64, recorded_at: i64, bucket_start: i64) -> Self {
        Stream {
            hash,
            last_seen_at: recorded_at,
            total_size: size,
            rate_buckets: vec![RateBucket {
                timestamp: bucket_start,
                size,
            }],
        }
    }

    /// Whether the stream was seen at or after `cutoff`
    #[inline]
    pub fn is_active(&self, cutoff: i64) -> bool {
        self.last_seen_at >= cutoff
    }

    /// Accounts `size` bytes received at `recorded_at`
    ///
    /// Buckets older than `bounds.cutoff` are dropped, the bucket at
    /// `bounds.start` is created or grown, and the last-seen time is refreshed.
    pub fn merge(&mut self, size: u64, recorded_at: i64, bounds: BucketBounds) {
        self.rate_buckets.retain(|b| b.timestamp >= bounds.cutoff);

        match self
            .rate_buckets
            .iter_mut()
            .find(|b| b.timestamp == bounds.start)
        {
            Some(bucket) => bucket.size = bucket.size.saturating_add(size),
            None => self.rate_buckets.push(RateBucket {
                timestamp: bounds.start,
                size,
            }),
        }

        self.total_size = self.total_size.saturating_add(size);
        self.last_seen_at = recorded_at;
    }

    /// Clears accumulated state so an expired slot can be reused
    pub(crate) fn reset(&mut self, recorded_at: i64) {
        self.last_seen_at = recorded_at;
        self.total_size = 0;
        self.rate_buckets.clear();
    }

    /// Sum of bucket bytes for buckets starting at or after `cutoff`
    pub fn window_bytes(&self, cutoff: i64) -> u64 {
        self.rate_buckets
            .iter()
            .filter(|b| b.timestamp >= cutoff)
            .fold(0u64, |acc, b| acc.saturating_add(b.size))
    }
}
