//! HTTP request handlers

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::catalog::sync::{read_listing, sync_listing, SyncReport};
use crate::catalog::CatalogStore;
use crate::error::{ProxyError, Result};
use crate::state::AppState;

/// Query parameters of `/video`.
#[derive(Debug, Default, Deserialize)]
pub struct VideoParams {
    #[serde(alias = "nombre")]
    pub name: Option<String>,
}

/// Stream a catalog video
/// GET /video?name=<identifier>
pub async fn video(
    State(state): State<Arc<AppState>>,
    Query(params): Query<VideoParams>,
    headers: HeaderMap,
) -> Result<Response> {
    let resource = state.resolver.resolve(params.name.as_deref().unwrap_or_default())?;
    state
        .proxy
        .serve(&resource, headers.get(header::RANGE))
        .await
}

/// Describe a catalog video without fetching its body
/// HEAD /video?name=<identifier>
pub async fn video_head(
    State(state): State<Arc<AppState>>,
    Query(params): Query<VideoParams>,
    headers: HeaderMap,
) -> Result<Response> {
    let resource = state.resolver.resolve(params.name.as_deref().unwrap_or_default())?;
    state
        .proxy
        .describe(&resource, headers.get(header::RANGE))
        .await
}

/// Merge the configured listing file into the catalog
/// POST /sync-movies
pub async fn sync_movies(State(state): State<Arc<AppState>>) -> Result<Json<SyncReport>> {
    let path = state
        .config
        .catalog
        .listing_path
        .clone()
        .ok_or_else(|| ProxyError::Config("no catalog listing configured".into()))?;

    let files = tokio::task::spawn_blocking(move || read_listing(path))
        .await
        .map_err(|e| ProxyError::Catalog(e.to_string()))??;

    let report = sync_listing(&state.catalog, &files);
    tracing::info!(
        "Catalog sync: {} inserted, {} skipped",
        report.inserted,
        report.skipped
    );
    Ok(Json(report))
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}

#[derive(Debug, Serialize)]
pub struct VersionInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub catalog_entries: usize,
}

/// Version endpoint
pub async fn version_check(State(state): State<Arc<AppState>>) -> Json<VersionInfo> {
    Json(VersionInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        catalog_entries: state.catalog.len(),
    })
}
