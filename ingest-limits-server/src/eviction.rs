//! Periodic eviction of inactive streams
//!
//! The store never cleans itself up. This task runs a time-based eviction
//! pass at a fixed interval and refreshes the store size gauges.

use crate::service::LimitsService;
use ingest_limits::nanos;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::task::JoinHandle;

/// Run one eviction pass at `now`, returning the number of removed streams
pub fn evict_once(service: &LimitsService, now: i64) -> usize {
    let started = Instant::now();
    let evicted = service.evict_expired(now);
    let elapsed = started.elapsed();

    let total: usize = evicted.values().sum();
    for (tenant, count) in &evicted {
        tracing::debug!(tenant = %tenant, count, "Evicted inactive streams");
    }

    let store = service.store();
    let metrics = service.metrics();
    metrics.record_eviction(total, elapsed.as_micros() as u64);
    metrics.update_store_size(store.tenant_len(), store.stream_len());

    if total > 0 {
        tracing::info!(
            evicted = total,
            tenants = evicted.len(),
            elapsed_us = elapsed.as_micros() as u64,
            "Eviction pass completed"
        );
    }

    total
}

/// Spawn the eviction loop
///
/// The first pass runs one `interval` after startup.
pub fn spawn(service: Arc<LimitsService>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            evict_once(&service, nanos(SystemTime::now()));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::metrics::Metrics;
    use crate::types::RecordRequest;
    use clap::Parser;
    use ingest_limits::StreamMetadata;
    use std::sync::atomic::Ordering;

    fn service() -> Arc<LimitsService> {
        let config = Config::from_args(crate::config::Args::parse_from([
            "ingest-limits",
            "--num-partitions",
            "1",
            "--active-window",
            "60",
        ]));
        Arc::new(LimitsService::new(
            &config,
            Arc::new(StreamMetadata::with_shard_count(2)),
            Arc::new(Metrics::new()),
            0,
        ))
    }

    fn record(service: &LimitsService, tenant: &str, stream_hash: u64, timestamp: i64) {
        service.record(
            &RecordRequest {
                tenant: tenant.to_string(),
                partition: 0,
                stream_hash,
                size: 1,
                timestamp: Some(timestamp),
            },
            timestamp,
        );
    }

    #[test]
    fn test_evict_once_updates_metrics() {
        let service = service();
        let sec = 1_000_000_000i64;

        record(&service, "a", 1, 10 * sec);
        record(&service, "a", 2, 100 * sec);
        record(&service, "b", 3, 20 * sec);

        // Cutoff is 140s - 60s = 80s
        assert_eq!(evict_once(&service, 140 * sec), 2);

        let metrics = service.metrics();
        assert_eq!(metrics.eviction_runs.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.streams_evicted.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.tracked_tenants.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.tracked_streams.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_loop_runs_on_interval() {
        let service = service();
        // Seen at the epoch, long expired by the wall clock
        record(&service, "a", 1, 0);

        let handle = spawn(Arc::clone(&service), Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(31)).await;
        handle.abort();

        assert!(service.store().is_empty());
        assert_eq!(service.metrics().eviction_runs.load(Ordering::Relaxed), 1);
    }
}
