//! Integration tests for `/api/analyze` and `/api/youtube-frame`.

mod common;

use std::sync::atomic::Ordering;

use axum::http::StatusCode;
use serde_json::json;

use common::{
    body_json, build_test_app, build_test_app_with_capture, detection, post_json, FakeCompleter,
    FakeDetector,
};
use crowdwatch_monitor::scheduler::AnalysisMode;

/// 1x1 transparent PNG.
const PIXEL_PNG: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

// ---------------------------------------------------------------------------
// Test: a data-URI image is analyzed and counts are derived
// ---------------------------------------------------------------------------

#[tokio::test]
async fn analyze_returns_detections() {
    let app = common::test_app();
    let response = post_json(
        app.router(),
        "/api/analyze",
        json!({ "image": format!("data:image/png;base64,{PIXEL_PNG}") }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["detections"]["people"], 3);
    assert_eq!(body["detections"]["peopleFromObjects"], 3);
    assert_eq!(body["detections"]["facesDetected"], 2);
    assert_eq!(body["detections"]["objects"].as_array().unwrap().len(), 3);
    assert!(body["timestamp"].is_string());
}

// ---------------------------------------------------------------------------
// Test: feedId commits the detection only while analysis is running
// ---------------------------------------------------------------------------

#[tokio::test]
async fn analyze_with_feed_id_commits_while_running() {
    let app = common::test_app();
    // cam-004 is in maintenance, so no polling task writes to it.
    let request = json!({ "image": PIXEL_PNG, "feedId": "cam-004" });

    let response = post_json(app.router(), "/api/analyze", request.clone()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["committed"], false);
    let feed = app.state.store.feed("cam-004").await.unwrap();
    assert_eq!(feed.runtime.people_count, 0);
    assert!(feed.runtime.last_detection.is_none());

    app.state.scheduler.start(AnalysisMode::Background).await;
    let response = post_json(app.router(), "/api/analyze", request.clone()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["committed"], true);

    let feed = app.state.store.feed("cam-004").await.unwrap();
    assert_eq!(feed.runtime.people_count, 3);
    assert_eq!(feed.runtime.last_detection.unwrap().faces_detected, 2);

    app.state.scheduler.stop().await;
    let writes = app.state.store.writes().await;
    let response = post_json(app.router(), "/api/analyze", request).await;
    assert_eq!(body_json(response).await["committed"], false);
    assert_eq!(app.state.store.writes().await, writes);

    for running in [false, true] {
        if running {
            app.state.scheduler.start(AnalysisMode::Background).await;
        }
        let response = post_json(
            app.router(),
            "/api/analyze",
            json!({ "image": PIXEL_PNG, "feedId": "cam-404" }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "running: {running}");
    }
    app.state.scheduler.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: missing or undecodable images are rejected before detection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn analyze_rejects_missing_image() {
    let detector = FakeDetector::returning(detection(1, 0));
    let app = build_test_app(detector.clone(), FakeCompleter::replying("ok"));

    let response = post_json(app.router(), "/api/analyze", json!({})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "No image provided");

    let response = post_json(app.router(), "/api/analyze", json!({ "image": "%%%" })).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// Test: unconfigured detection is 503 without calling out
// ---------------------------------------------------------------------------

#[tokio::test]
async fn analyze_unconfigured_is_503() {
    let detector = FakeDetector::unconfigured();
    let app = build_test_app(detector.clone(), FakeCompleter::replying("ok"));

    let response = post_json(app.router(), "/api/analyze", json!({ "image": PIXEL_PNG })).await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["code"], "NOT_CONFIGURED");
    assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// Test: upstream failures surface as 502 with the service message
// ---------------------------------------------------------------------------

#[tokio::test]
async fn analyze_upstream_error_is_502() {
    let app = build_test_app(FakeDetector::failing(), FakeCompleter::replying("ok"));

    let response = post_json(app.router(), "/api/analyze", json!({ "image": PIXEL_PNG })).await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert_eq!(body["code"], "UPSTREAM_ERROR");
    assert_eq!(body["error"], "API key not valid");
}

// ---------------------------------------------------------------------------
// Test: remote frame capture returns a JPEG data URI
// ---------------------------------------------------------------------------

#[tokio::test]
async fn youtube_frame_returns_data_uri() {
    let app = common::test_app();

    for key in ["streamUrl", "youtubeUrl"] {
        let response = post_json(
            app.router(),
            "/api/youtube-frame",
            json!({ key: "https://www.youtube.com/watch?v=NscyTzvTjHE" }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK, "{key}");
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert!(body["image"]
            .as_str()
            .unwrap()
            .starts_with("data:image/jpeg;base64,"));
        assert_eq!(body["width"], 1280);
    }
}

#[tokio::test]
async fn youtube_frame_requires_url() {
    let app = common::test_app();
    let response = post_json(app.router(), "/api/youtube-frame", json!({ "streamUrl": " " })).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn youtube_frame_capture_failure_is_502() {
    let app = build_test_app_with_capture(
        FakeDetector::returning(detection(0, 0)),
        FakeCompleter::replying("ok"),
        false,
    );
    let response = post_json(
        app.router(),
        "/api/youtube-frame",
        json!({ "streamUrl": "https://www.youtube.com/watch?v=NscyTzvTjHE" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["code"], "CAPTURE_FAILED");
}
