//! Video streaming proxy
//!
//! Serves videos from a catalog by relaying them from their remote host,
//! with HTTP byte-range support so browsers can seek without the proxy
//! downloading whole files.

#[macro_use]
mod macros;

mod catalog;
mod config;
mod config_file;
mod error;
mod http;
mod metrics;
mod proxy;
mod range;
mod resolver;
mod state;
mod upstream;


use clap::Parser;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::catalog::sync::{read_listing, sync_listing};
use crate::catalog::{CatalogStore, MemoryCatalog};
use crate::config::ServerConfig;
use crate::config_file::{generate_default_config, ConfigFile};
use crate::error::{ProxyError, Result};
use crate::http::create_router;
use crate::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "video-proxy";

#[derive(Parser, Debug, Clone)]
#[command(name = "video-proxy")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Address to listen on, overrides the config file
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Catalog JSON file, overrides the config file
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Write a default configuration file and exit
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.init_config {
        generate_default_config(&args.config)?;
        println!("Wrote default configuration to {}", args.config.display());
        return Ok(());
    }

    // The config decides the log level, so problems loading it are reported
    // once logging is up.
    let (mut config, config_warning) = load_config(&args.config);
    if let Some(addr) = args.bind {
        config.host = addr.ip().to_string();
        config.port = addr.port();
    }
    if let Some(path) = args.catalog {
        config.catalog.path = Some(path);
    }

    init_logging(&config);
    if let Some(warning) = config_warning {
        tracing::warn!("{}", warning);
    }
    config.validate()?;

    tracing::info!("{} v{} starting", APP_NAME, VERSION);
    tracing::debug!("Configuration loaded: {:?}", config);

    let catalog = Arc::new(load_catalog(&config)?);

    // Create application state
    let state = Arc::new(AppState::new(config.clone(), catalog)?);

    // Build router
    let app = create_router(state);

    // Start server
    let addr: SocketAddr = config
        .socket_addr()
        .parse()
        .map_err(|e| ProxyError::Config(format!("bad listen address: {}", e)))?;
    tracing::info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn load_config(path: &Path) -> (ServerConfig, Option<String>) {
    if !path.exists() {
        return (ServerConfig::default(), None);
    }
    match ConfigFile::from_file(path) {
        Ok(cf) => (cf.into_server_config(), None),
        Err(e) => (
            ServerConfig::default(),
            Some(format!(
                "Failed to load config file {}: {}. Using defaults.",
                path.display(),
                e
            )),
        ),
    }
}

/// Load the catalog file, then merge the listing file into it if one is
/// configured. A broken listing is not fatal.
fn load_catalog(config: &ServerConfig) -> Result<MemoryCatalog> {
    let catalog = match &config.catalog.path {
        Some(path) => {
            let catalog = MemoryCatalog::load(path)?;
            tracing::info!("Loaded {} videos from {}", catalog.len(), path.display());
            catalog
        }
        None => {
            tracing::warn!("No catalog file configured, starting empty");
            MemoryCatalog::new()
        }
    };

    if let Some(path) = &config.catalog.listing_path {
        match read_listing(path) {
            Ok(files) => {
                let report = sync_listing(&catalog, &files);
                tracing::info!(
                    "Synchronized {}: {} inserted, {} skipped",
                    path.display(),
                    report.inserted,
                    report.skipped
                );
            }
            Err(e) => tracing::warn!("Failed to read listing {}: {}", path.display(), e),
        }
    }

    Ok(catalog)
}

/// Initialize logging with tracing
fn init_logging(config: &ServerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("video_proxy={},tower_http=info", config.log_level).into()
    });
    let registry = tracing_subscriber::registry().with(filter);

    if config.log_format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
