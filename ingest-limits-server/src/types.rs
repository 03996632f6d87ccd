//! Request and response types shared by the service and its transports
//!
//! Timestamps are Unix nanoseconds. Where a request carries an optional
//! `timestamp`, the server's clock is used when it is absent.

use ingest_limits::{Reason, RejectedStream};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata for one stream of an admission request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamMetadataEntry {
    /// Hash of the stream's label set
    pub stream_hash: u64,
    /// Bytes of log lines
    pub entry_size: u64,
    /// Bytes of structured metadata
    #[serde(default)]
    pub structured_metadata_size: u64,
}

impl StreamMetadataEntry {
    /// Bytes accounted against the stream
    pub fn total_size(&self) -> u64 {
        self.entry_size.saturating_add(self.structured_metadata_size)
    }
}

/// Ask whether a tenant's streams may be ingested
///
/// # Example
///
/// ```json
/// {
///   "tenant": "tenant-1",
///   "streams": [
///     { "stream_hash": 1234, "entry_size": 512, "structured_metadata_size": 64 }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExceedsLimitsRequest {
    pub tenant: String,
    pub streams: Vec<StreamMetadataEntry>,
    /// Unix timestamp in nanoseconds (optional, defaults to current time)
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl ExceedsLimitsRequest {
    /// Check the request before it reaches the store
    ///
    /// # Errors
    ///
    /// Returns a message describing the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.tenant.is_empty() {
            return Err("tenant must not be empty".to_string());
        }
        validate_timestamp(self.timestamp)?;
        if let Some(entry) = self.streams.iter().find(|e| {
            e.entry_size
                .checked_add(e.structured_metadata_size)
                .is_none()
        }) {
            return Err(format!("size of stream {} overflows", entry.stream_hash));
        }
        Ok(())
    }
}

/// A stream that must not be ingested
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExceedsLimitsResult {
    pub stream_hash: u64,
    /// Numeric rejection reason (1 = exceeds maximum active streams)
    pub reason: u32,
}

impl From<RejectedStream> for ExceedsLimitsResult {
    fn from(rejected: RejectedStream) -> Self {
        ExceedsLimitsResult {
            stream_hash: rejected.hash,
            reason: rejected.reason.code(),
        }
    }
}

impl ExceedsLimitsResult {
    pub fn reason(&self) -> Option<Reason> {
        Reason::from_code(self.reason)
    }
}

/// Only rejected streams are listed; an empty list admits the whole request
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExceedsLimitsResponse {
    pub results: Vec<ExceedsLimitsResult>,
}

/// Partitions owned by this node with their assignment time
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssignedPartitionsResponse {
    pub assigned_partitions: BTreeMap<i32, i64>,
}

/// Assign or revoke a set of partitions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionsRequest {
    pub partitions: Vec<i32>,
}

/// Partitions whose ownership actually changed
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartitionsResponse {
    pub partitions: Vec<i32>,
}

/// A record consumed from the source topic, stored without admission checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordRequest {
    pub tenant: String,
    pub partition: i32,
    pub stream_hash: u64,
    pub size: u64,
    /// Unix timestamp in nanoseconds (optional, defaults to current time)
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl RecordRequest {
    /// Check the request before it reaches the store
    ///
    /// # Errors
    ///
    /// Returns a message describing the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.tenant.is_empty() {
            return Err("tenant must not be empty".to_string());
        }
        validate_timestamp(self.timestamp)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordResponse {
    /// False when the partition is not assigned to this node
    pub stored: bool,
}

/// Usage of one partition of a tenant
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PartitionUsageEntry {
    pub partition: i32,
    pub active_streams: u64,
    pub total_size: u64,
    pub window_bytes: u64,
}

/// A tenant's active streams and ingestion rate on this node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UsageResponse {
    pub tenant: String,
    pub active_streams: u64,
    pub total_size: u64,
    /// Average bytes per second over the rate window
    pub rate: f64,
    pub partitions: Vec<PartitionUsageEntry>,
}

/// Timestamps before the Unix epoch are rejected
fn validate_timestamp(timestamp: Option<i64>) -> Result<(), String> {
    match timestamp {
        Some(ts) if ts < 0 => Err(format!("timestamp {ts} is before the Unix epoch")),
        _ => Ok(()),
    }
}
