//! Admission policies for new stream slots
//!
//! The store consults an [`AdmissionPolicy`] only for candidates that would
//! occupy a new slot in a partition: streams it has never seen and streams
//! whose last write is older than the active cutoff. Already-active streams
//! hold their slot and bypass the policy.
//!
//! Decisions are returned as a plain `bool`. Anything a policy wants to
//! report goes to the [`Rejections`] sink passed next to it; the store never
//! reads the sink.

use std::fmt;

use super::stream::StreamUpdate;

/// Why a stream was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Reason {
    /// Admitting the stream would exceed the partition's active stream limit
    ExceedsMaxStreams = 1,
}

impl Reason {
    /// Numeric code used on the wire
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Reason::ExceedsMaxStreams),
            _ => None,
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::ExceedsMaxStreams => write!(f, "exceeds maximum active streams"),
        }
    }
}

/// A stream refused by a policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejectedStream {
    pub hash: u64,
    pub reason: Reason,
}

/// Output sink for policy decisions, in decision order
#[derive(Debug, Default, Clone)]
pub struct Rejections {
    streams: Vec<RejectedStream>,
}

impl Rejections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, hash: u64, reason: Reason) {
        self.streams.push(RejectedStream { hash, reason });
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RejectedStream> {
        self.streams.iter()
    }

    /// Hashes rejected for `reason`
    pub fn hashes(&self, reason: Reason) -> Vec<u64> {
        self.streams
            .iter()
            .filter(|r| r.reason == reason)
            .map(|r| r.hash)
            .collect()
    }

    pub fn into_vec(self) -> Vec<RejectedStream> {
        self.streams
    }
}

/// Decides whether a candidate may take a new stream slot
///
/// `count` is the number of active streams in the partition plus every new
/// candidate seen so far in the batch, including this one. Refused
/// candidates keep their place in `count`, so a burst of new streams in a
/// single batch cannot overshoot a limit.
///
/// Closures of the shape `Fn(u64, &StreamUpdate, &mut Rejections) -> bool`
/// implement the trait.
///
/// # Example
///
/// ```
/// use ingest_limits::{AdmissionPolicy, Rejections, Reason, StreamUpdate};
///
/// let only_even = |_count: u64, stream: &StreamUpdate, rejections: &mut Rejections| {
///     if stream.hash % 2 == 0 {
///         return true;
///     }
///     rejections.push(stream.hash, Reason::ExceedsMaxStreams);
///     false
/// };
///
/// let mut rejections = Rejections::new();
/// assert!(only_even.admit(1, &StreamUpdate::new(2, 10, 0), &mut rejections));
/// assert!(!only_even.admit(2, &StreamUpdate::new(3, 10, 0), &mut rejections));
/// assert_eq!(rejections.len(), 1);
/// ```
pub trait AdmissionPolicy {
    fn admit(&self, count: u64, stream: &StreamUpdate, rejections: &mut Rejections) -> bool;
}

impl<F> AdmissionPolicy for F
where
    F: Fn(u64, &StreamUpdate, &mut Rejections) -> bool,
{
    fn admit(&self, count: u64, stream: &StreamUpdate, rejections: &mut Rejections) -> bool {
        self(count, stream, rejections)
    }
}

/// Accepts new streams while the partition holds at most `limit` active streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxActiveStreams {
    limit: u64,
}

impl MaxActiveStreams {
    pub fn new(limit: u64) -> Self {
        MaxActiveStreams { limit }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }
}

impl AdmissionPolicy for MaxActiveStreams {
    fn admit(&self, count: u64, stream: &StreamUpdate, rejections: &mut Rejections) -> bool {
        if count > self.limit {
            rejections.push(stream.hash, Reason::ExceedsMaxStreams);
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_active_streams_boundary() {
        let policy = MaxActiveStreams::new(2);
        let mut rejections = Rejections::new();
        let stream = StreamUpdate::new(9, 1, 0);

        assert!(policy.admit(1, &stream, &mut rejections));
        assert!(policy.admit(2, &stream, &mut rejections));
        assert!(!policy.admit(3, &stream, &mut rejections));

        assert_eq!(
            rejections.into_vec(),
            vec![RejectedStream {
                hash: 9,
                reason: Reason::ExceedsMaxStreams
            }]
        );
    }

    #[test]
    fn test_zero_limit_rejects_everything() {
        let policy = MaxActiveStreams::new(0);
        let mut rejections = Rejections::new();
        assert!(!policy.admit(1, &StreamUpdate::new(1, 1, 0), &mut rejections));
        assert_eq!(rejections.hashes(Reason::ExceedsMaxStreams), vec![1]);
    }

    #[test]
    fn test_reason_codes() {
        assert_eq!(Reason::ExceedsMaxStreams.code(), 1);
        assert_eq!(Reason::from_code(1), Some(Reason::ExceedsMaxStreams));
        assert_eq!(Reason::from_code(0), None);
        assert_eq!(
            Reason::ExceedsMaxStreams.to_string(),
            "exceeds maximum active streams"
        );
    }
}
