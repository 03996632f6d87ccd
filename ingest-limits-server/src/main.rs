use anyhow::Result;
use ingest_limits::{StreamMetadata, nanos};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::task::JoinSet;

use ingest_limits_server::config::Config;
use ingest_limits_server::eviction;
use ingest_limits_server::metrics::Metrics;
use ingest_limits_server::service::LimitsService;
use ingest_limits_server::transport::{Transport, http::HttpTransport};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration from environment variables and CLI arguments
    let config = Config::from_env_and_args()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("ingest_limits={}", config.log_level).parse()?)
                .add_directive(format!("ingest_limits_server={}", config.log_level).parse()?),
        )
        .init();

    let store = Arc::new(
        StreamMetadata::builder()
            .shards(config.store.shards)
            .capacity(config.store.capacity)
            .build(),
    );
    let metrics = Arc::new(Metrics::new());
    let service = Arc::new(LimitsService::new(
        &config,
        store,
        Arc::clone(&metrics),
        nanos(SystemTime::now()),
    ));

    // Background eviction of inactive streams
    let eviction_task = eviction::spawn(Arc::clone(&service), config.store.eviction_interval());

    let mut transport_tasks = JoinSet::new();

    {
        let service = Arc::clone(&service);
        let host = config.http.host.clone();
        let port = config.http.port;

        transport_tasks.spawn(async move {
            tracing::info!("Starting HTTP transport on {}:{}", host, port);
            let transport = HttpTransport::new(&host, port)?;
            transport.start(service).await
        });
    }

    tracing::info!(
        "Ingest limits server started with {} shards, max {} active streams per partition",
        config.store.shards,
        config.limits.max_active_streams
    );
    tracing::info!(
        "Assigned {} of {} partitions, active window {}s, rate window {}s",
        config.partitions.assigned.len(),
        config.partitions.num_partitions,
        config.limits.active_window,
        config.limits.rate_window
    );

    // Wait for all transport tasks to complete (they run indefinitely)
    while let Some(result) = transport_tasks.join_next().await {
        match result {
            Ok(Ok(())) => {
                tracing::info!("Transport task completed successfully");
            }
            Ok(Err(e)) => {
                tracing::error!("Transport task failed: {}", e);
                eviction_task.abort();
                return Err(e);
            }
            Err(e) => {
                tracing::error!("Transport task panicked: {}", e);
                eviction_task.abort();
                return Err(anyhow::anyhow!("Transport task panicked"));
            }
        }
    }

    eviction_task.abort();
    Ok(())
}
