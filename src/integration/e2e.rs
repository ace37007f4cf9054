//! End-to-end tests: proxy router in front of the fixture host.

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::response::Response;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::util::ServiceExt;

use super::fixtures::{movie_bytes, proxy_state, Behavior, UpstreamHost, MOVIE_TYPE};
use crate::catalog::DEFAULT_CONTENT_TYPE;
use crate::http::create_router;
use crate::state::AppState;

async fn request_video(state: &Arc<AppState>, range: Option<&str>) -> Response {
    let mut request = Request::get("/video?name=Inception");
    if let Some(range) = range {
        request = request.header(header::RANGE, range);
    }
    create_router(state.clone())
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn send_video(
    state: &Arc<AppState>,
    method: Method,
    range: Option<HeaderValue>,
) -> Response {
    let mut request = Request::builder()
        .method(method)
        .uri("/video?name=Inception");
    if let Some(range) = range {
        request = request.header(header::RANGE, range);
    }
    create_router(state.clone())
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

fn header_str<'a>(response: &'a Response, name: header::HeaderName) -> Option<&'a str> {
    response.headers().get(name).map(|v| v.to_str().unwrap())
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

#[tokio::test]
async fn test_partial_content() {
    let host = UpstreamHost::start(Behavior::Normal).await;
    let state = proxy_state(&host.url, |_| {});

    let response = request_video(&state, Some("bytes=500-599")).await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        header_str(&response, header::CONTENT_RANGE),
        Some("bytes 500-599/1000")
    );
    assert_eq!(header_str(&response, header::CONTENT_LENGTH), Some("100"));
    assert_eq!(header_str(&response, header::ACCEPT_RANGES), Some("bytes"));
    assert_eq!(header_str(&response, header::CONTENT_TYPE), Some(MOVIE_TYPE));
    assert_eq!(body_bytes(response).await, movie_bytes()[500..600].to_vec());
    assert_eq!(state.metrics.bytes_relayed(), 100);
}

#[tokio::test]
async fn test_full_content() {
    let host = UpstreamHost::start(Behavior::Normal).await;
    let state = proxy_state(&host.url, |_| {});

    let response = request_video(&state, None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, header::CONTENT_LENGTH), Some("1000"));
    assert_eq!(header_str(&response, header::ACCEPT_RANGES), Some("bytes"));
    assert!(header_str(&response, header::CONTENT_RANGE).is_none());
    assert_eq!(body_bytes(response).await, movie_bytes());
}

#[tokio::test]
async fn test_open_ended_range() {
    let host = UpstreamHost::start(Behavior::Normal).await;
    let state = proxy_state(&host.url, |_| {});

    let response = request_video(&state, Some("bytes=990-")).await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        header_str(&response, header::CONTENT_RANGE),
        Some("bytes 990-999/1000")
    );
    assert_eq!(body_bytes(response).await, movie_bytes()[990..].to_vec());
}

#[tokio::test]
async fn test_end_beyond_size_is_clamped() {
    let host = UpstreamHost::start(Behavior::Normal).await;
    let state = proxy_state(&host.url, |_| {});

    let response = request_video(&state, Some("bytes=900-5000")).await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        header_str(&response, header::CONTENT_RANGE),
        Some("bytes 900-999/1000")
    );
    assert_eq!(header_str(&response, header::CONTENT_LENGTH), Some("100"));
    assert_eq!(body_bytes(response).await, movie_bytes()[900..].to_vec());
}

#[tokio::test]
async fn test_malformed_range() {
    let host = UpstreamHost::start(Behavior::Normal).await;
    let state = proxy_state(&host.url, |_| {});

    for range in ["bytes=abc-xyz", "bytes=-500", "bytes=0-1,5-9", "items=0-1"] {
        let response = request_video(&state, Some(range)).await;
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE, "{}", range);
        assert_eq!(
            header_str(&response, header::CONTENT_RANGE),
            Some("bytes */1000")
        );
        assert!(body_bytes(response).await.is_empty());
    }
    assert_eq!(host.gets(), 0);
}

#[tokio::test]
async fn test_non_ascii_range_is_unsatisfiable() {
    let host = UpstreamHost::start(Behavior::Normal).await;
    let state = proxy_state(&host.url, |_| {});

    let range = HeaderValue::from_bytes(b"bytes=\xff-10").unwrap();
    let response = send_video(&state, Method::GET, Some(range)).await;

    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(
        header_str(&response, header::CONTENT_RANGE),
        Some("bytes */1000")
    );
    assert!(body_bytes(response).await.is_empty());
    assert_eq!(host.gets(), 0);
}

#[tokio::test]
async fn test_empty_range_is_full_transfer() {
    let host = UpstreamHost::start(Behavior::Normal).await;
    let state = proxy_state(&host.url, |_| {});

    let response = request_video(&state, Some("  ")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, movie_bytes());
}

#[tokio::test]
async fn test_start_beyond_size_never_reaches_upstream() {
    let host = UpstreamHost::start(Behavior::Normal).await;
    let state = proxy_state(&host.url, |_| {});

    let response = request_video(&state, Some("bytes=1000-")).await;

    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(
        header_str(&response, header::CONTENT_RANGE),
        Some("bytes */1000")
    );
    assert!(body_bytes(response).await.is_empty());
    assert_eq!(host.heads(), 1);
    assert_eq!(host.gets(), 0);
}

#[tokio::test]
async fn test_probe_failure_falls_back() {
    let host = UpstreamHost::start(Behavior::ProbeFails).await;
    let state = proxy_state(&host.url, |_| {});

    let response = request_video(&state, None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header_str(&response, header::CONTENT_TYPE),
        Some(DEFAULT_CONTENT_TYPE)
    );
    assert!(header_str(&response, header::CONTENT_LENGTH).is_none());
    assert_eq!(body_bytes(response).await, movie_bytes());
    assert_eq!(state.metrics.probe_failures(), 1);
}

#[tokio::test]
async fn test_probe_failure_with_range() {
    let host = UpstreamHost::start(Behavior::ProbeFails).await;
    let state = proxy_state(&host.url, |_| {});

    let response = request_video(&state, Some("bytes=500-599")).await;

    // The upstream's own Content-Range supplies the total.
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        header_str(&response, header::CONTENT_RANGE),
        Some("bytes 500-599/1000")
    );
    assert_eq!(header_str(&response, header::CONTENT_LENGTH), Some("100"));
    assert_eq!(body_bytes(response).await, movie_bytes()[500..600].to_vec());
}

#[tokio::test]
async fn test_slow_probe_times_out() {
    let host = UpstreamHost::start(Behavior::SlowProbe).await;
    let state = proxy_state(&host.url, |config| config.upstream.probe_timeout_secs = 1);

    let started = Instant::now();
    let response = request_video(&state, None).await;

    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header_str(&response, header::CONTENT_TYPE),
        Some(DEFAULT_CONTENT_TYPE)
    );
    assert_eq!(body_bytes(response).await, movie_bytes());
    assert_eq!(state.metrics.probe_failures(), 1);
}

#[tokio::test]
async fn test_upstream_abort_yields_prefix() {
    let host = UpstreamHost::start(Behavior::AbortAfter(50)).await;
    let state = proxy_state(&host.url, |_| {});

    let response = request_video(&state, Some("bytes=100-299")).await;

    // Headers were committed before the failure.
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(header_str(&response, header::CONTENT_LENGTH), Some("200"));

    let body = body_bytes(response).await;
    let expected = &movie_bytes()[100..300];
    assert!(body.len() < expected.len());
    assert!(expected.starts_with(&body));
    assert_eq!(state.metrics.truncated_relays(), 1);
}

#[tokio::test]
async fn test_upstream_ignoring_range() {
    let host = UpstreamHost::start(Behavior::IgnoresRange).await;
    let state = proxy_state(&host.url, |config| config.upstream.chunk_size = 64);

    let response = request_video(&state, Some("bytes=500-599")).await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        header_str(&response, header::CONTENT_RANGE),
        Some("bytes 500-599/1000")
    );
    assert_eq!(body_bytes(response).await, movie_bytes()[500..600].to_vec());
}

#[tokio::test]
async fn test_unknown_size_learned_from_full_answer() {
    let host = UpstreamHost::start(Behavior::BlindIgnoresRange).await;
    let state = proxy_state(&host.url, |config| config.upstream.chunk_size = 64);

    let response = request_video(&state, Some("bytes=500-599")).await;

    // The 200's Content-Length becomes the total; leading bytes are skipped.
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        header_str(&response, header::CONTENT_RANGE),
        Some("bytes 500-599/1000")
    );
    assert_eq!(header_str(&response, header::CONTENT_LENGTH), Some("100"));
    assert_eq!(body_bytes(response).await, movie_bytes()[500..600].to_vec());
    assert_eq!(state.metrics.probe_failures(), 1);
}

#[tokio::test]
async fn test_unknown_size_start_past_full_answer() {
    let host = UpstreamHost::start(Behavior::BlindIgnoresRange).await;
    let state = proxy_state(&host.url, |_| {});

    let response = request_video(&state, Some("bytes=5000-")).await;

    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(
        header_str(&response, header::CONTENT_RANGE),
        Some("bytes */1000")
    );
    assert!(body_bytes(response).await.is_empty());
    assert_eq!(host.gets(), 1);
}

#[tokio::test]
async fn test_head_answers_from_probe() {
    let host = UpstreamHost::start(Behavior::Normal).await;
    let state = proxy_state(&host.url, |_| {});

    let response = send_video(&state, Method::HEAD, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, header::CONTENT_LENGTH), Some("1000"));
    assert_eq!(header_str(&response, header::CONTENT_TYPE), Some(MOVIE_TYPE));

    let range = HeaderValue::from_static("bytes=500-599");
    let response = send_video(&state, Method::HEAD, Some(range)).await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        header_str(&response, header::CONTENT_RANGE),
        Some("bytes 500-599/1000")
    );
    assert_eq!(header_str(&response, header::CONTENT_LENGTH), Some("100"));
    assert!(body_bytes(response).await.is_empty());

    let range = HeaderValue::from_static("bytes=1000-");
    let response = send_video(&state, Method::HEAD, Some(range)).await;
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);

    assert_eq!(host.gets(), 0);
    assert_eq!(state.metrics.aborted_relays(), 0);
    assert_eq!(state.metrics.bytes_relayed(), 0);
}

#[tokio::test]
async fn test_unknown_size_uses_upstream_bounds() {
    let host = UpstreamHost::start(Behavior::NoLength).await;
    let state = proxy_state(&host.url, |_| {});

    let response = request_video(&state, Some("bytes=10-19")).await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        header_str(&response, header::CONTENT_RANGE),
        Some("bytes 10-19/*")
    );
    assert!(header_str(&response, header::CONTENT_LENGTH).is_none());
    assert_eq!(
        header_str(&response, header::CONTENT_TYPE),
        Some(DEFAULT_CONTENT_TYPE)
    );
    assert_eq!(body_bytes(response).await, movie_bytes()[10..20].to_vec());
}

#[tokio::test]
async fn test_unknown_size_unsatisfiable() {
    let host = UpstreamHost::start(Behavior::NoLength).await;
    let state = proxy_state(&host.url, |_| {});

    let response = request_video(&state, Some("bytes=5000-")).await;

    // Nothing to check locally, so the upstream is asked and answers 416.
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(
        header_str(&response, header::CONTENT_RANGE),
        Some("bytes */1000")
    );
    assert_eq!(host.gets(), 1);
}

#[tokio::test]
async fn test_chunks_bounded_by_chunk_size() {
    let host = UpstreamHost::start(Behavior::Normal).await;
    let state = proxy_state(&host.url, |config| config.upstream.chunk_size = 128);

    let response = request_video(&state, None).await;
    let mut stream = response.into_body().into_data_stream();

    let mut received = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.unwrap();
        assert!(chunk.len() <= 128);
        received.extend_from_slice(&chunk);
    }
    assert_eq!(received, movie_bytes());
}

#[tokio::test]
async fn test_client_disconnect_releases_upstream() {
    let host = UpstreamHost::start(Behavior::Normal).await;
    let state = proxy_state(&host.url, |config| config.upstream.chunk_size = 100);

    let response = request_video(&state, None).await;
    let mut stream = response.into_body().into_data_stream();
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.len(), 100);
    drop(stream);

    assert_eq!(state.metrics.aborted_relays(), 1);
    assert_eq!(state.metrics.truncated_relays(), 0);
}

#[tokio::test]
async fn test_concurrent_requests_are_independent() {
    let host = UpstreamHost::start(Behavior::Normal).await;
    let state = proxy_state(&host.url, |config| config.upstream.chunk_size = 16);

    let (a, b) = tokio::join!(
        request_video(&state, Some("bytes=0-99")),
        request_video(&state, Some("bytes=800-899")),
    );
    let (a, b) = tokio::join!(body_bytes(a), body_bytes(b));

    let movie = movie_bytes();
    assert_eq!(a, movie[0..100].to_vec());
    assert_eq!(b, movie[800..900].to_vec());
}

async fn post_sync(state: &Arc<AppState>) -> serde_json::Value {
    let response = create_router(state.clone())
        .oneshot(Request::post("/sync-movies").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

#[tokio::test]
async fn test_sync_movies_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let listing = dir.path().join("listing.json");
    std::fs::write(
        &listing,
        r#"{"files": [
            {"id": "a1", "name": "videoplayback.mp4", "mimeType": "video/mp4"},
            {"id": "a2", "name": "inception-1699999999.mp4", "mimeType": "video/mp4",
             "webContentLink": "https://drive.example/a2", "size": "2048"},
            {"id": "a3", "name": "notes.txt", "mimeType": "text/plain"}
        ]}"#,
    )
    .unwrap();

    let host = UpstreamHost::start(Behavior::Normal).await;
    let listing_path = listing.clone();
    let state = proxy_state(&host.url, move |config| {
        config.catalog.listing_path = Some(listing_path)
    });

    // "Inception" is taken by the fixture entry, so the synced one is renamed.
    let report = post_sync(&state).await;
    assert_eq!(report["inserted"], 2);
    assert_eq!(report["skipped"], 1);
    assert!(state.catalog.contains_identifier("Video 1"));
    assert!(state.catalog.contains_identifier("Inception (2)"));

    let report = post_sync(&state).await;
    assert_eq!(report["inserted"], 0);
    assert_eq!(report["skipped"], 3);
}
