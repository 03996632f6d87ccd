//! # ingest-limits-server
//!
//! Admission-control service that enforces per-tenant active stream limits
//! over the partitions assigned to this node.
//!
//! The server keeps stream metadata in a sharded [`ingest_limits::StreamMetadata`]
//! store. Each admission request is split by partition and checked against
//! the configured maximum number of active streams; accepted streams are
//! recorded, rejected ones are reported back with a reason code. A background
//! task evicts streams that have been inactive for longer than the active
//! window.
//!
//! ## Configuration
//!
//! All settings can be given as CLI flags or `INGEST_LIMITS_*` environment
//! variables. Run `ingest-limits --list-env-vars` to see them.
//!
//! ## Transports
//!
//! - HTTP/JSON, see [`transport::http`]

pub mod config;
pub mod eviction;
pub mod metrics;
pub mod partitions;
pub mod service;
pub mod transport;
pub mod types;
