//! Transport layer implementations for the limits server
//!
//! # Available Transports
//!
//! - [`http`]: REST API with JSON (easy integration)

pub mod http;


use crate::service::LimitsService;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Common interface for all transport implementations
///
/// Each transport is responsible for:
/// - Accepting client connections
/// - Parsing protocol-specific requests
/// - Forwarding requests to the shared limits service
/// - Sending responses back to clients
#[async_trait]
pub trait Transport {
    /// Start the transport server
    ///
    /// Runs until an error occurs or the server shuts down.
    async fn start(self, service: Arc<LimitsService>) -> Result<()>;
}
