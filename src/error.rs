use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::range::unsatisfied_content_range;

/// Main error type for the video proxy
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Missing 'name' parameter")]
    MissingName,

    #[error("Video not found: {0}")]
    NotFound(String),

    #[error("No upstream URL for video: {0}")]
    MissingUpstreamReference(String),

    #[error("Range not satisfiable")]
    RangeNotSatisfiable { size: Option<u64> },

    #[error("Upstream error: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] axum::http::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    /// HTTP status this error maps to when it reaches a client.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MissingName => StatusCode::BAD_REQUEST,
            ProxyError::NotFound(_) => StatusCode::NOT_FOUND,
            ProxyError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            // 416 carries no body, only the unsatisfied Content-Range.
            ProxyError::RangeNotSatisfiable { size } => {
                let mut response = status.into_response();
                if let Ok(value) = HeaderValue::from_str(&unsatisfied_content_range(size)) {
                    response.headers_mut().insert(header::CONTENT_RANGE, value);
                }
                response
                    .headers_mut()
                    .insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
                response
            }
            ProxyError::MissingUpstreamReference(ref id) => {
                tracing::error!("Catalog entry '{}' has no usable upstream URL", id);
                (status, self.to_string()).into_response()
            }
            other => {
                if status.is_server_error() {
                    tracing::error!("{}", other);
                }
                (status, other.to_string()).into_response()
            }
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ProxyError>;
