//! HTTP/JSON transport
//!
//! # API Endpoints
//!
//! ## POST /exceeds-limits
//!
//! Check a tenant's streams against the active stream limit.
//!
//! ### Request Body
//!
//! ```json
//! {
//!   "tenant": "tenant-1",
//!   "streams": [
//!     { "stream_hash": 1234, "entry_size": 512, "structured_metadata_size": 64 }
//!   ],
//!   "timestamp": 1234567890123456789
//! }
//! ```
//!
//! - `structured_metadata_size` is optional (defaults to 0)
//! - `timestamp` is optional (defaults to current time, in nanoseconds)
//!
//! Requests with an empty tenant, a timestamp before the Unix epoch or a
//! stream size that overflows are rejected with 400.
//!
//! ### Response
//!
//! Only rejected streams are listed:
//!
//! ```json
//! { "results": [ { "stream_hash": 1234, "reason": 1 } ] }
//! ```
//!
//! ## GET /assigned-partitions
//!
//! Partitions owned by this node and their assignment time in nanoseconds.
//!
//! ## POST /partitions/assign, POST /partitions/revoke
//!
//! Change partition ownership: `{ "partitions": [0, 1] }`. Revoking drops the
//! metadata of every stream on the revoked partitions.
//!
//! ## POST /records
//!
//! Store a consumed record without checking limits.
//!
//! ## GET /usage/{tenant}
//!
//! Active streams and ingestion rate of a tenant.
//!
//! ## GET /metrics
//!
//! Prometheus text format.
//!
//! ## GET /health
//!
//! Health check endpoint. Returns "OK" with 200 status.

use super::Transport;
use crate::metrics::Endpoint;
use crate::service::LimitsService;
use crate::types::{
    AssignedPartitionsResponse, ExceedsLimitsRequest, ExceedsLimitsResponse, PartitionsRequest,
    PartitionsResponse, RecordRequest, RecordResponse, UsageResponse,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use ingest_limits::nanos;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct HttpErrorResponse {
    /// Error message
    pub error: String,
}

type HttpError = (StatusCode, Json<HttpErrorResponse>);

/// HTTP transport implementation
#[derive(Debug)]
pub struct HttpTransport {
    addr: SocketAddr,
}

impl HttpTransport {
    pub fn new(host: &str, port: u16) -> Result<Self> {
        let addr = format!("{host}:{port}")
            .parse()
            .with_context(|| format!("Invalid HTTP address {host}:{port}"))?;
        Ok(Self { addr })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn start(self, service: Arc<LimitsService>) -> Result<()> {
        let app = router(service);

        tracing::info!("HTTP server listening on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

/// Build the HTTP routes over a shared service
pub fn router(service: Arc<LimitsService>) -> Router {
    Router::new()
        .route("/exceeds-limits", post(handle_exceeds_limits))
        .route("/assigned-partitions", get(handle_assigned_partitions))
        .route("/partitions/assign", post(handle_assign_partitions))
        .route("/partitions/revoke", post(handle_revoke_partitions))
        .route("/records", post(handle_record))
        .route("/usage/{tenant}", get(handle_usage))
        .route("/metrics", get(handle_metrics))
        .route("/health", get(|| async { "OK" }))
        .with_state(service)
}

fn now() -> i64 {
    nanos(SystemTime::now())
}

fn bad_request(error: impl Into<String>) -> HttpError {
    (
        StatusCode::BAD_REQUEST,
        Json(HttpErrorResponse {
            error: error.into(),
        }),
    )
}

async fn handle_exceeds_limits(
    State(service): State<Arc<LimitsService>>,
    Json(req): Json<ExceedsLimitsRequest>,
) -> Result<Json<ExceedsLimitsResponse>, HttpError> {
    req.validate().map_err(bad_request)?;

    let started = Instant::now();
    let response = service.exceeds_limits(&req, req.timestamp.unwrap_or_else(now));
    service
        .metrics()
        .record_request(Endpoint::ExceedsLimits, started.elapsed().as_micros() as u64);

    Ok(Json(response))
}

async fn handle_assigned_partitions(
    State(service): State<Arc<LimitsService>>,
) -> Json<AssignedPartitionsResponse> {
    let started = Instant::now();
    let response = service.assigned_partitions();
    service
        .metrics()
        .record_request(Endpoint::Partitions, started.elapsed().as_micros() as u64);
    Json(response)
}

async fn handle_assign_partitions(
    State(service): State<Arc<LimitsService>>,
    Json(req): Json<PartitionsRequest>,
) -> Result<Json<PartitionsResponse>, HttpError> {
    let num_partitions = service.num_partitions();
    if let Some(invalid) = req
        .partitions
        .iter()
        .find(|p| **p < 0 || **p as u32 >= num_partitions)
    {
        return Err(bad_request(format!("invalid partition {invalid}")));
    }

    let started = Instant::now();
    let partitions = service.assign_partitions(&req.partitions, now());
    service
        .metrics()
        .record_request(Endpoint::Partitions, started.elapsed().as_micros() as u64);

    Ok(Json(PartitionsResponse { partitions }))
}

async fn handle_revoke_partitions(
    State(service): State<Arc<LimitsService>>,
    Json(req): Json<PartitionsRequest>,
) -> Json<PartitionsResponse> {
    let started = Instant::now();
    let partitions = service.revoke_partitions(&req.partitions);
    service
        .metrics()
        .record_request(Endpoint::Partitions, started.elapsed().as_micros() as u64);

    Json(PartitionsResponse { partitions })
}

async fn handle_record(
    State(service): State<Arc<LimitsService>>,
    Json(req): Json<RecordRequest>,
) -> Result<Json<RecordResponse>, HttpError> {
    req.validate().map_err(bad_request)?;

    let started = Instant::now();
    let stored = service.record(&req, now());
    service
        .metrics()
        .record_request(Endpoint::Record, started.elapsed().as_micros() as u64);

    Ok(Json(RecordResponse { stored }))
}

async fn handle_usage(
    State(service): State<Arc<LimitsService>>,
    Path(tenant): Path<String>,
) -> Json<UsageResponse> {
    let started = Instant::now();
    let response = service.usage(&tenant, now());
    service
        .metrics()
        .record_request(Endpoint::Usage, started.elapsed().as_micros() as u64);
    Json(response)
}

async fn handle_metrics(State(service): State<Arc<LimitsService>>) -> String {
    let store = service.store();
    service
        .metrics()
        .update_store_size(store.tenant_len(), store.stream_len());
    service.metrics().export_prometheus()
}
