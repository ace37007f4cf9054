//! Application state management
//!
//! This module defines the AppState structure that holds:
//! - The video catalog and the resolver reading it
//! - The range streaming proxy and its upstream client
//! - Metrics
//! - Server configuration

use std::sync::Arc;

use crate::catalog::MemoryCatalog;
use crate::config::ServerConfig;
use crate::error::Result;
use crate::metrics::Metrics;
use crate::proxy::RangeProxy;
use crate::resolver::Resolver;
use crate::upstream::UpstreamClient;

/// Application state shared across all handlers
pub struct AppState {
    /// Catalog, shared with the resolver
    pub catalog: Arc<MemoryCatalog>,

    /// Identifier -> resource lookup
    pub resolver: Resolver,

    /// Range streaming proxy
    pub proxy: RangeProxy,

    /// Metrics collector
    pub metrics: Arc<Metrics>,

    /// Server configuration
    pub config: ServerConfig,
}

impl AppState {
    /// Create a new AppState, building the upstream client from `config`.
    pub fn new(config: ServerConfig, catalog: Arc<MemoryCatalog>) -> Result<Self> {
        let upstream = UpstreamClient::new(&config.upstream)?;
        Ok(Self::with_upstream(config, catalog, upstream))
    }

    /// Create a new AppState around an existing upstream client.
    pub fn with_upstream(
        config: ServerConfig,
        catalog: Arc<MemoryCatalog>,
        upstream: UpstreamClient,
    ) -> Self {
        let metrics = Arc::new(Metrics::new());
        let proxy = RangeProxy::new(upstream, config.upstream.chunk_size, metrics.clone());
        Self {
            resolver: Resolver::new(catalog.clone()),
            catalog,
            proxy,
            metrics,
            config,
        }
    }
}
