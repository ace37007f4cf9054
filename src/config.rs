//! Server configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ProxyError, Result};

/// Upstream (media host) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Time budget for the metadata probe in seconds
    pub probe_timeout_secs: u64,

    /// TCP connect timeout in seconds
    pub connect_timeout_secs: u64,

    /// Maximum size of a relayed body chunk in bytes
    pub chunk_size: usize,

    /// User-Agent sent upstream
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            probe_timeout_secs: 5,
            connect_timeout_secs: 10,
            chunk_size: 4096,
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl UpstreamConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Catalog sources
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// JSON file with catalog entries, loaded at startup
    pub path: Option<PathBuf>,

    /// JSON file listing from the storage backend, merged on startup and on
    /// every sync request
    pub listing_path: Option<PathBuf>,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Allowed CORS origin. `None` allows any origin.
    pub cors_origin: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Log output format (pretty, json)
    pub log_format: String,

    /// Upstream configuration
    pub upstream: UpstreamConfig,

    /// Catalog configuration
    pub catalog: CatalogConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9090,
            cors_origin: None,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            upstream: UpstreamConfig::default(),
            catalog: CatalogConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string. IPv6 hosts are bracketed.
    pub fn socket_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Reject settings the proxy cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.upstream.chunk_size == 0 {
            return Err(ProxyError::Config("upstream.chunk_size must be > 0".into()));
        }
        if self.upstream.probe_timeout_secs == 0 {
            return Err(ProxyError::Config(
                "upstream.probe_timeout_secs must be > 0".into(),
            ));
        }
        if !matches!(self.log_format.as_str(), "pretty" | "json") {
            return Err(ProxyError::Config(format!(
                "unknown log format '{}'",
                self.log_format
            )));
        }
        Ok(())
    }
}
