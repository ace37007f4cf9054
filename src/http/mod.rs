//! HTTP server module
//!
//! This module handles HTTP request routing and handling:
//! - Axum router with the video, sync and service endpoints
//! - Request handlers
//! - Request logging middleware
//! - CORS

pub mod handlers;
pub mod middleware;
pub mod routes;

pub use routes::create_router;
