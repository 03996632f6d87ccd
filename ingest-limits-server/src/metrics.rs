//! Simple metrics collection for observability
//!
//! Lightweight atomic counters, exported in Prometheus text format on
//! `GET /metrics`.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

/// Core metrics collected by the server
pub struct Metrics {
    /// Server start time
    start_time: Instant,

    /// Requests by endpoint
    pub exceeds_limits_requests: AtomicU64,
    pub record_requests: AtomicU64,
    pub usage_requests: AtomicU64,
    pub partition_requests: AtomicU64,

    /// Admission decisions
    pub streams_checked: AtomicU64,
    pub streams_rejected: AtomicU64,
    pub accepted_bytes: AtomicU64,

    /// Bypass writes
    pub records_stored: AtomicU64,
    pub records_dropped: AtomicU64,

    /// Request latency buckets (in microseconds)
    pub latency_under_1ms: AtomicU64,
    pub latency_under_10ms: AtomicU64,
    pub latency_under_100ms: AtomicU64,
    pub latency_over_100ms: AtomicU64,
    pub latency_sum_micros: AtomicU64,
    pub latency_count: AtomicU64,

    /// Store metrics
    pub eviction_runs: AtomicU64,
    pub streams_evicted: AtomicU64,
    pub last_eviction_micros: AtomicU64,
    pub tracked_tenants: AtomicUsize,
    pub tracked_streams: AtomicUsize,
    pub assigned_partitions: AtomicUsize,
}

/// Endpoint type for metrics tracking
#[derive(Debug, Clone, Copy)]
pub enum Endpoint {
    ExceedsLimits,
    Record,
    Usage,
    Partitions,
}

impl Metrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            exceeds_limits_requests: AtomicU64::new(0),
            record_requests: AtomicU64::new(0),
            usage_requests: AtomicU64::new(0),
            partition_requests: AtomicU64::new(0),
            streams_checked: AtomicU64::new(0),
            streams_rejected: AtomicU64::new(0),
            accepted_bytes: AtomicU64::new(0),
            records_stored: AtomicU64::new(0),
            records_dropped: AtomicU64::new(0),
            latency_under_1ms: AtomicU64::new(0),
            latency_under_10ms: AtomicU64::new(0),
            latency_under_100ms: AtomicU64::new(0),
            latency_over_100ms: AtomicU64::new(0),
            latency_sum_micros: AtomicU64::new(0),
            latency_count: AtomicU64::new(0),
            eviction_runs: AtomicU64::new(0),
            streams_evicted: AtomicU64::new(0),
            last_eviction_micros: AtomicU64::new(0),
            tracked_tenants: AtomicUsize::new(0),
            tracked_streams: AtomicUsize::new(0),
            assigned_partitions: AtomicUsize::new(0),
        }
    }

    /// Record a request and its latency
    pub fn record_request(&self, endpoint: Endpoint, latency_us: u64) {
        match endpoint {
            Endpoint::ExceedsLimits => self.exceeds_limits_requests.fetch_add(1, Ordering::Relaxed),
            Endpoint::Record => self.record_requests.fetch_add(1, Ordering::Relaxed),
            Endpoint::Usage => self.usage_requests.fetch_add(1, Ordering::Relaxed),
            Endpoint::Partitions => self.partition_requests.fetch_add(1, Ordering::Relaxed),
        };

        match latency_us {
            0..=999 => self.latency_under_1ms.fetch_add(1, Ordering::Relaxed),
            1000..=9999 => self.latency_under_10ms.fetch_add(1, Ordering::Relaxed),
            10000..=99999 => self.latency_under_100ms.fetch_add(1, Ordering::Relaxed),
            _ => self.latency_over_100ms.fetch_add(1, Ordering::Relaxed),
        };

        self.latency_sum_micros
            .fetch_add(latency_us, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of an admission check
    pub fn record_admission(&self, checked: usize, rejected: usize, accepted_bytes: u64) {
        self.streams_checked
            .fetch_add(checked as u64, Ordering::Relaxed);
        self.streams_rejected
            .fetch_add(rejected as u64, Ordering::Relaxed);
        self.accepted_bytes
            .fetch_add(accepted_bytes, Ordering::Relaxed);
    }

    /// Record a bypass write
    pub fn record_write(&self, stored: bool) {
        if stored {
            self.records_stored.fetch_add(1, Ordering::Relaxed);
        } else {
            self.records_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record an eviction pass
    pub fn record_eviction(&self, evicted: usize, duration_us: u64) {
        self.eviction_runs.fetch_add(1, Ordering::Relaxed);
        self.streams_evicted
            .fetch_add(evicted as u64, Ordering::Relaxed);
        self.last_eviction_micros
            .store(duration_us, Ordering::Relaxed);
    }

    /// Update store size gauges
    pub fn update_store_size(&self, tenants: usize, streams: usize) {
        self.tracked_tenants.store(tenants, Ordering::Relaxed);
        self.tracked_streams.store(streams, Ordering::Relaxed);
    }

    pub fn update_assigned_partitions(&self, count: usize) {
        self.assigned_partitions.store(count, Ordering::Relaxed);
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        gauge(
            &mut output,
            "ingest_limits_uptime_seconds",
            "Time since server start in seconds",
            self.uptime_seconds(),
        );

        let _ = writeln!(
            output,
            "# HELP ingest_limits_requests_total Total requests by endpoint"
        );
        let _ = writeln!(output, "# TYPE ingest_limits_requests_total counter");
        for (endpoint, requests) in [
            ("exceeds_limits", &self.exceeds_limits_requests),
            ("record", &self.record_requests),
            ("usage", &self.usage_requests),
            ("partitions", &self.partition_requests),
        ] {
            let _ = writeln!(
                output,
                "ingest_limits_requests_total{{endpoint=\"{endpoint}\"}} {}",
                requests.load(Ordering::Relaxed)
            );
        }
        output.push('\n');

        counter(
            &mut output,
            "ingest_limits_streams_checked_total",
            "Streams submitted for admission",
            self.streams_checked.load(Ordering::Relaxed),
        );
        counter(
            &mut output,
            "ingest_limits_streams_rejected_total",
            "Streams rejected for exceeding the active stream limit",
            self.streams_rejected.load(Ordering::Relaxed),
        );
        counter(
            &mut output,
            "ingest_limits_accepted_bytes_total",
            "Bytes accepted by admission checks",
            self.accepted_bytes.load(Ordering::Relaxed),
        );
        counter(
            &mut output,
            "ingest_limits_records_stored_total",
            "Records stored without admission checks",
            self.records_stored.load(Ordering::Relaxed),
        );
        counter(
            &mut output,
            "ingest_limits_records_dropped_total",
            "Records dropped because their partition is not assigned",
            self.records_dropped.load(Ordering::Relaxed),
        );

        // Latency distribution
        let under_1ms = self.latency_under_1ms.load(Ordering::Relaxed);
        let under_10ms = under_1ms + self.latency_under_10ms.load(Ordering::Relaxed);
        let under_100ms = under_10ms + self.latency_under_100ms.load(Ordering::Relaxed);
        let total = under_100ms + self.latency_over_100ms.load(Ordering::Relaxed);

        let _ = writeln!(
            output,
            "# HELP ingest_limits_request_duration_seconds Request latency distribution"
        );
        let _ = writeln!(
            output,
            "# TYPE ingest_limits_request_duration_seconds histogram"
        );
        for (le, count) in [
            ("0.001", under_1ms),
            ("0.01", under_10ms),
            ("0.1", under_100ms),
            ("+Inf", total),
        ] {
            let _ = writeln!(
                output,
                "ingest_limits_request_duration_seconds_bucket{{le=\"{le}\"}} {count}"
            );
        }
        let latency_sum_seconds =
            self.latency_sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        let _ = writeln!(
            output,
            "ingest_limits_request_duration_seconds_sum {latency_sum_seconds:.6}"
        );
        let _ = writeln!(
            output,
            "ingest_limits_request_duration_seconds_count {}\n",
            self.latency_count.load(Ordering::Relaxed)
        );

        // Store metrics
        counter(
            &mut output,
            "ingest_limits_eviction_runs_total",
            "Completed eviction passes",
            self.eviction_runs.load(Ordering::Relaxed),
        );
        counter(
            &mut output,
            "ingest_limits_streams_evicted_total",
            "Streams removed by eviction passes",
            self.streams_evicted.load(Ordering::Relaxed),
        );
        gauge(
            &mut output,
            "ingest_limits_last_eviction_duration_microseconds",
            "Duration of the most recent eviction pass",
            self.last_eviction_micros.load(Ordering::Relaxed),
        );
        gauge(
            &mut output,
            "ingest_limits_tracked_tenants",
            "Tenants with at least one tracked stream",
            self.tracked_tenants.load(Ordering::Relaxed) as u64,
        );
        gauge(
            &mut output,
            "ingest_limits_tracked_streams",
            "Streams currently tracked",
            self.tracked_streams.load(Ordering::Relaxed) as u64,
        );
        gauge(
            &mut output,
            "ingest_limits_assigned_partitions",
            "Partitions assigned to this node",
            self.assigned_partitions.load(Ordering::Relaxed) as u64,
        );

        output
    }
}

fn counter(output: &mut String, name: &str, help: &str, value: u64) {
    metric(output, name, help, "counter", value);
}

fn gauge(output: &mut String, name: &str, help: &str, value: u64) {
    metric(output, name, help, "gauge", value);
}

fn metric(output: &mut String, name: &str, help: &str, kind: &str, value: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {kind}");
    let _ = writeln!(output, "{name} {value}\n");
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
