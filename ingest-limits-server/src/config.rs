//! Server configuration and CLI argument parsing
//!
//! Configuration comes from command-line arguments with environment variable
//! fallbacks (prefix `INGEST_LIMITS_`).
//!
//! # Configuration Priority
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables
//! 3. Default values (lowest priority)
//!
//! # Example Usage
//!
//! ```bash
//! # Using CLI arguments
//! ingest-limits --http-port 9090 --max-active-streams 5000
//!
//! # Using environment variables
//! export INGEST_LIMITS_HTTP_PORT=8080
//! export INGEST_LIMITS_ASSIGNED_PARTITIONS=0,1,2,3
//! ingest-limits
//! ```

use anyhow::{Result, anyhow};
use clap::Parser;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for the server
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// HTTP transport configuration
    pub http: HttpConfig,
    /// Stream metadata store configuration
    pub store: StoreConfig,
    /// Admission limits
    pub limits: LimitsConfig,
    /// Partitions of the source topic
    pub partitions: PartitionConfig,
    /// Logging level (error, warn, info, debug, trace)
    pub log_level: String,
}

/// HTTP transport configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Host address to bind to (e.g., "0.0.0.0")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

/// Stream metadata store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Number of independently locked shards
    pub shards: usize,
    /// Expected tenants per shard
    pub capacity: usize,
    /// Interval between eviction passes (seconds)
    pub eviction_interval: u64,
}

/// Admission limits and the windows they are evaluated over
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum active streams per tenant partition
    pub max_active_streams: u64,
    /// A stream is active if seen within this window (seconds)
    pub active_window: u64,
    /// Sliding window for rate accounting (seconds)
    pub rate_window: u64,
    /// Rate bucket granularity (seconds)
    pub bucket_duration: u64,
}

/// Source topic partitioning
#[derive(Debug, Clone, Deserialize)]
pub struct PartitionConfig {
    /// Total number of partitions; a stream belongs to `hash % num_partitions`
    pub num_partitions: u32,
    /// Partitions owned by this node at startup
    pub assigned: Vec<i32>,
}

impl LimitsConfig {
    pub fn active_window(&self) -> Duration {
        Duration::from_secs(self.active_window)
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window)
    }

    pub fn bucket_duration(&self) -> Duration {
        Duration::from_secs(self.bucket_duration)
    }
}

impl StoreConfig {
    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval)
    }
}

/// Command-line arguments for the server
///
/// All arguments can also be set via environment variables with the
/// INGEST_LIMITS_ prefix. CLI arguments take precedence over environment variables.
#[derive(Parser, Debug)]
#[command(
    name = "ingest-limits",
    about = "Per-tenant active stream admission control",
    long_about = "Tracks per-tenant stream activity for locally assigned partitions and rejects streams that would exceed the active stream limit.\n\nEnvironment variables with INGEST_LIMITS_ prefix are supported. CLI arguments take precedence over environment variables."
)]
pub struct Args {
    // HTTP Transport
    #[arg(
        long,
        value_name = "HOST",
        help = "HTTP host",
        default_value = "127.0.0.1",
        env = "INGEST_LIMITS_HTTP_HOST"
    )]
    pub http_host: String,
    #[arg(
        long,
        value_name = "PORT",
        help = "HTTP port",
        default_value_t = 8080,
        env = "INGEST_LIMITS_HTTP_PORT"
    )]
    pub http_port: u16,

    // Store Configuration
    #[arg(
        long,
        value_name = "N",
        help = "Number of store shards",
        default_value_t = 64,
        env = "INGEST_LIMITS_STORE_SHARDS"
    )]
    pub store_shards: usize,
    #[arg(
        long,
        value_name = "SIZE",
        help = "Expected tenants per shard",
        default_value_t = 64,
        env = "INGEST_LIMITS_STORE_CAPACITY"
    )]
    pub store_capacity: usize,
    #[arg(
        long,
        value_name = "SECS",
        help = "Interval between eviction passes (seconds)",
        default_value_t = 60,
        env = "INGEST_LIMITS_EVICTION_INTERVAL"
    )]
    pub eviction_interval: u64,

    // Limits
    #[arg(
        long,
        value_name = "N",
        help = "Maximum active streams per tenant partition",
        default_value_t = 10_000,
        env = "INGEST_LIMITS_MAX_ACTIVE_STREAMS"
    )]
    pub max_active_streams: u64,
    #[arg(
        long,
        value_name = "SECS",
        help = "Window within which a stream counts as active (seconds)",
        default_value_t = 7_200,
        env = "INGEST_LIMITS_ACTIVE_WINDOW"
    )]
    pub active_window: u64,
    #[arg(
        long,
        value_name = "SECS",
        help = "Sliding window for rate accounting (seconds)",
        default_value_t = 300,
        env = "INGEST_LIMITS_RATE_WINDOW"
    )]
    pub rate_window: u64,
    #[arg(
        long,
        value_name = "SECS",
        help = "Rate bucket granularity (seconds)",
        default_value_t = 60,
        env = "INGEST_LIMITS_BUCKET_DURATION"
    )]
    pub bucket_duration: u64,

    // Partitions
    #[arg(
        long,
        value_name = "N",
        help = "Total number of source partitions",
        default_value_t = 64,
        env = "INGEST_LIMITS_NUM_PARTITIONS"
    )]
    pub num_partitions: u32,
    #[arg(
        long,
        value_name = "IDS",
        help = "Comma-separated partitions assigned to this node (default: all)",
        value_delimiter = ',',
        env = "INGEST_LIMITS_ASSIGNED_PARTITIONS"
    )]
    pub assigned_partitions: Vec<i32>,

    // General options
    #[arg(
        long,
        value_name = "LEVEL",
        help = "Log level: error, warn, info, debug, trace",
        default_value = "info",
        env = "INGEST_LIMITS_LOG_LEVEL"
    )]
    pub log_level: String,

    // Utility options
    #[arg(
        long,
        help = "List all environment variables and exit",
        action = clap::ArgAction::SetTrue
    )]
    pub list_env_vars: bool,
}

impl Config {
    /// Build configuration from environment variables and CLI arguments
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting configuration is invalid.
    pub fn from_env_and_args() -> Result<Self> {
        let args = Args::parse();

        if args.list_env_vars {
            Self::print_env_vars();
            std::process::exit(0);
        }

        let config = Self::from_args(args);
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from already parsed arguments
    ///
    /// An empty partition list means this node owns every partition.
    pub fn from_args(args: Args) -> Self {
        let assigned = if args.assigned_partitions.is_empty() {
            (0..args.num_partitions as i32).collect()
        } else {
            args.assigned_partitions
        };

        Config {
            http: HttpConfig {
                host: args.http_host,
                port: args.http_port,
            },
            store: StoreConfig {
                shards: args.store_shards,
                capacity: args.store_capacity,
                eviction_interval: args.eviction_interval,
            },
            limits: LimitsConfig {
                max_active_streams: args.max_active_streams,
                active_window: args.active_window,
                rate_window: args.rate_window,
                bucket_duration: args.bucket_duration,
            },
            partitions: PartitionConfig {
                num_partitions: args.num_partitions,
                assigned,
            },
            log_level: args.log_level,
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.store.shards == 0 {
            return Err(anyhow!("Store shard count must be greater than 0"));
        }
        if self.store.eviction_interval == 0 {
            return Err(anyhow!("Eviction interval must be greater than 0"));
        }
        if self.limits.active_window == 0 {
            return Err(anyhow!("Active window must be greater than 0"));
        }
        if self.limits.bucket_duration == 0 || self.limits.rate_window == 0 {
            return Err(anyhow!(
                "Rate window and bucket duration must be greater than 0"
            ));
        }
        if self.limits.bucket_duration > self.limits.rate_window {
            return Err(anyhow!(
                "Bucket duration ({}s) must not exceed the rate window ({}s)",
                self.limits.bucket_duration,
                self.limits.rate_window
            ));
        }
        if self.partitions.num_partitions == 0 {
            return Err(anyhow!("Number of partitions must be greater than 0"));
        }
        if let Some(invalid) = self
            .partitions
            .assigned
            .iter()
            .find(|p| **p < 0 || **p as u32 >= self.partitions.num_partitions)
        {
            return Err(anyhow!(
                "Assigned partition {} is outside 0..{}",
                invalid,
                self.partitions.num_partitions
            ));
        }

        Ok(())
    }

    /// Print all available environment variables and their descriptions
    fn print_env_vars() {
        println!("Ingest Limits Environment Variables");
        println!("===================================");
        println!();
        println!("All environment variables use the INGEST_LIMITS_ prefix.");
        println!("CLI arguments take precedence over environment variables.");
        println!();

        println!("Transport Configuration:");
        println!("  INGEST_LIMITS_HTTP_HOST=<host>              HTTP host [default: 127.0.0.1]");
        println!("  INGEST_LIMITS_HTTP_PORT=<port>              HTTP port [default: 8080]");
        println!();

        println!("Store Configuration:");
        println!("  INGEST_LIMITS_STORE_SHARDS=<n>              Number of shards [default: 64]");
        println!("  INGEST_LIMITS_STORE_CAPACITY=<size>         Tenants per shard [default: 64]");
        println!("  INGEST_LIMITS_EVICTION_INTERVAL=<secs>      Eviction interval [default: 60]");
        println!();

        println!("Limits Configuration:");
        println!(
            "  INGEST_LIMITS_MAX_ACTIVE_STREAMS=<n>        Active streams per partition [default: 10000]"
        );
        println!("  INGEST_LIMITS_ACTIVE_WINDOW=<secs>          Active window [default: 7200]");
        println!("  INGEST_LIMITS_RATE_WINDOW=<secs>            Rate window [default: 300]");
        println!("  INGEST_LIMITS_BUCKET_DURATION=<secs>        Rate bucket size [default: 60]");
        println!();

        println!("Partition Configuration:");
        println!("  INGEST_LIMITS_NUM_PARTITIONS=<n>            Source partitions [default: 64]");
        println!(
            "  INGEST_LIMITS_ASSIGNED_PARTITIONS=<ids>     Owned partitions, e.g. 0,1,2 [default: all]"
        );
        println!();

        println!("General Configuration:");
        println!(
            "  INGEST_LIMITS_LOG_LEVEL=<level>             Log level: error, warn, info, debug, trace [default: info]"
        );
    }
}
