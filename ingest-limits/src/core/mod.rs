//! Core components of the ingest-limits library
//!
//! This module contains the fundamental building blocks:
//! - [`rate`]: Bucket placement and sliding-window rates
//! - [`stream`]: Per-stream metadata and the bucket merge
//! - [`policy`]: Admission policies and the rejection sink
//! - [`store`]: The sharded stream metadata store
//! - [`usage`]: Per-tenant usage summaries

pub mod policy;
pub mod rate;
pub mod store;
pub mod stream;
pub mod usage;

pub use policy::{AdmissionPolicy, MaxActiveStreams, Reason, RejectedStream, Rejections};
pub use rate::{BucketBounds, RateWindow, nanos};
pub use store::{StreamMetadata, StreamMetadataBuilder};
pub use stream::{RateBucket, Stream, StreamUpdate};
pub use usage::{PartitionUsage, TenantUsage};
