//! Configuration file support
//!
//! Loads server configuration from TOML files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::{CatalogConfig, ServerConfig, UpstreamConfig};
use crate::error::{ProxyError, Result};

/// Configuration file format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Server settings
    pub server: ServerSettings,
    /// Upstream settings
    pub upstream: Option<UpstreamSettings>,
    /// Catalog settings
    pub catalog: Option<CatalogSettings>,
    /// Logging settings
    pub logging: Option<LoggingSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Allowed CORS origin
    pub cors_origin: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamSettings {
    /// Probe time budget in seconds
    pub probe_timeout_secs: Option<u64>,
    /// Connect timeout in seconds
    pub connect_timeout_secs: Option<u64>,
    /// Relay chunk size in bytes
    pub chunk_size: Option<usize>,
    /// User-Agent header
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSettings {
    /// Catalog JSON file
    pub path: Option<PathBuf>,
    /// Storage backend listing JSON file
    pub listing_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: Option<String>,
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: ConfigFile = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ProxyError::Config(e.to_string()))?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Generate default configuration file
    pub fn default_config() -> Self {
        let upstream = UpstreamConfig::default();
        Self {
            server: ServerSettings {
                host: "0.0.0.0".to_string(),
                port: 9090,
                cors_origin: None,
            },
            upstream: Some(UpstreamSettings {
                probe_timeout_secs: Some(upstream.probe_timeout_secs),
                connect_timeout_secs: Some(upstream.connect_timeout_secs),
                chunk_size: Some(upstream.chunk_size),
                user_agent: None,
            }),
            catalog: Some(CatalogSettings {
                path: Some(PathBuf::from("catalog.json")),
                listing_path: None,
            }),
            logging: Some(LoggingSettings {
                level: "info".to_string(),
                format: Some("pretty".to_string()),
            }),
        }
    }

    /// Convert to ServerConfig
    pub fn into_server_config(self) -> ServerConfig {
        let defaults = UpstreamConfig::default();
        let upstream = match self.upstream {
            Some(u) => UpstreamConfig {
                probe_timeout_secs: u.probe_timeout_secs.unwrap_or(defaults.probe_timeout_secs),
                connect_timeout_secs: u
                    .connect_timeout_secs
                    .unwrap_or(defaults.connect_timeout_secs),
                chunk_size: u.chunk_size.unwrap_or(defaults.chunk_size),
                user_agent: u.user_agent.unwrap_or(defaults.user_agent),
            },
            None => defaults,
        };
        let (log_level, log_format) = match self.logging {
            Some(l) => (l.level, l.format.unwrap_or_else(|| "pretty".to_string())),
            None => ("info".to_string(), "pretty".to_string()),
        };

        ServerConfig {
            host: self.server.host,
            port: self.server.port,
            cors_origin: self.server.cors_origin,
            log_level,
            log_format,
            upstream,
            catalog: self
                .catalog
                .map(|c| CatalogConfig {
                    path: c.path,
                    listing_path: c.listing_path,
                })
                .unwrap_or_default(),
        }
    }
}

/// Generate default configuration file at the specified path
pub fn generate_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
    let config = ConfigFile::default_config();
    config.to_file(path)?;
    Ok(())
}
