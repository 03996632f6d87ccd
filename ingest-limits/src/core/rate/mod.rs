//! Sliding-window rate accounting
//!
//! Stream rates are approximated with fixed-duration byte buckets. This module
//! provides the [`RateWindow`] type which turns a record timestamp into the
//! [`BucketBounds`] the store needs for a write: the start of the bucket the
//! record falls into and the cutoff below which older buckets are dropped.
//!
//! All timestamps are Unix nanoseconds stored as `i64`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::stream::Stream;


/// Bucket placement for a single write
///
/// - `start`: the record time floored to the bucket duration
/// - `cutoff`: `start` minus the window length; buckets that start before it
///   are pruned on write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketBounds {
    pub start: i64,
    pub cutoff: i64,
}

/// RateWindow defines the bucket granularity and the sliding window length
///
/// # Examples
///
/// ```
/// use ingest_limits::RateWindow;
/// use std::time::Duration;
///
/// // One-minute buckets kept for five minutes
/// let window = RateWindow::new(Duration::from_secs(60), Duration::from_secs(300));
///
/// let bounds = window.bounds(90_000_000_000);
/// assert_eq!(bounds.start, 60_000_000_000);
/// assert_eq!(bounds.cutoff, 60_000_000_000 - 300_000_000_000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    bucket_duration: i64,
    window: i64,
}

impl RateWindow {
    /// Creates a rate window from a bucket duration and a window length
    ///
    /// # Panics
    ///
    /// Panics if either duration is zero or the bucket is longer than the window.
    pub fn new(bucket_duration: Duration, window: Duration) -> Self {
        assert!(!bucket_duration.is_zero(), "Bucket duration must be greater than 0");
        assert!(!window.is_zero(), "Rate window must be greater than 0");
        assert!(
            bucket_duration <= window,
            "Bucket duration must not exceed the rate window"
        );

        RateWindow {
            bucket_duration: duration_nanos(bucket_duration),
            window: duration_nanos(window),
        }
    }

    /// Returns the bucket duration
    pub fn bucket_duration(&self) -> Duration {
        Duration::from_nanos(self.bucket_duration as u64)
    }

    /// Returns the window length
    pub fn window(&self) -> Duration {
        Duration::from_nanos(self.window as u64)
    }

    /// Computes the bucket start and cutoff for a record seen at `now`
    ///
    /// Both saturate at `i64::MIN` for times near the lower end of the range.
    pub fn bounds(&self, now: i64) -> BucketBounds {
        let start = now.saturating_sub(now.rem_euclid(self.bucket_duration));
        BucketBounds {
            start,
            cutoff: start.saturating_sub(self.window),
        }
    }

    /// Average bytes per second the stream ingested over the window ending at `now`
    pub fn rate(&self, stream: &Stream, now: i64) -> f64 {
        let bytes = stream.window_bytes(self.bounds(now).cutoff);
        bytes as f64 / self.window().as_secs_f64()
    }
}

/// Converts a `SystemTime` to Unix nanoseconds
///
/// Times before the epoch map to negative values; times too far in the future
/// saturate at `i64::MAX`.
pub fn nanos(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => duration_nanos(d),
        Err(e) => -duration_nanos(e.duration()),
    }
}

fn duration_nanos(d: Duration) -> i64 {
    i64::try_from(d.as_nanos()).unwrap_or(i64::MAX)
}
