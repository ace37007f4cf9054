//! Axum router configuration

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::metrics::metrics_handler;
use crate::state::AppState;

use super::handlers::{health_check, sync_movies, version_check, video, video_head};
use super::middleware::request_logger;

/// Create the Axum router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    // Browsers issue Range requests from <video> elements and need the
    // range headers exposed to read them back.
    let cors = CorsLayer::new()
        .allow_origin(allowed_origin(state.config.cors_origin.as_deref()))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS, Method::HEAD])
        .allow_headers([
            header::ACCEPT,
            header::RANGE,
            header::CONTENT_TYPE,
            header::ORIGIN,
            header::AUTHORIZATION,
        ])
        .expose_headers([
            header::CONTENT_RANGE,
            header::CONTENT_LENGTH,
            header::ACCEPT_RANGES,
        ])
        .max_age(Duration::from_secs(3600));

    Router::new()
        // Media
        .route("/video", get(video).head(video_head))
        .route("/sync-movies", post(sync_movies))
        // Health, version and metrics
        .route("/health", get(health_check))
        .route("/version", get(version_check))
        .route("/metrics", get(metrics_handler))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), request_logger))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // State
        .with_state(state)
}

fn allowed_origin(origin: Option<&str>) -> AllowOrigin {
    match origin {
        None | Some("*") => AllowOrigin::from(Any),
        Some(origin) => match HeaderValue::from_str(origin) {
            Ok(value) => AllowOrigin::exact(value),
            Err(_) => {
                tracing::warn!("Invalid CORS origin '{}', allowing any origin", origin);
                AllowOrigin::from(Any)
            }
        },
    }
}
