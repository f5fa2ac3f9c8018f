//! Integration tests for the health check endpoint and general HTTP behaviour.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::{body_json, build_test_app, get, send};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Test: GET /health reports store and inference readiness
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_check_returns_ok_with_json() {
    let app = common::app_with_person_detector();
    let response = get(&app, "/health").await;

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert_eq!(json["store_healthy"], true);
    assert_eq!(json["inference_ready"], true);
    assert_eq!(json["detector"], "fixed");
}

#[tokio::test]
async fn health_is_degraded_without_a_detector() {
    let app = build_test_app(None);
    let json = body_json(get(&app, "/health").await).await;

    assert_eq!(json["status"], "degraded");
    assert_eq!(json["inference_ready"], false);
    assert!(json.get("detector").is_none());
}

#[tokio::test]
async fn health_is_degraded_when_the_store_is_down() {
    let app = build_test_app(Some(Arc::new(common::FixedDetector(vec![]))));
    app.memory.set_available(false);

    let response = get(&app, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["store_healthy"], false);
}

// ---------------------------------------------------------------------------
// Test: Unknown route returns 404
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_route_returns_404() {
    let app = build_test_app(None);
    let response = get(&app, "/this-route-does-not-exist").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Test: x-request-id header is present in response
// ---------------------------------------------------------------------------

#[tokio::test]
async fn response_contains_x_request_id_header() {
    let app = build_test_app(None);
    let response = get(&app, "/health").await;

    let request_id = response
        .headers()
        .get("x-request-id")
        .expect("Response must contain an x-request-id header");
    assert_eq!(request_id.to_str().unwrap().len(), 36, "x-request-id should be a UUID");
}

#[tokio::test]
async fn caller_request_id_is_propagated() {
    let app = build_test_app(None);
    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "req-1234")
        .body(Body::empty())
        .unwrap();

    let response = send(&app, request).await;
    assert_eq!(response.headers()["x-request-id"], "req-1234");
}

// ---------------------------------------------------------------------------
// Test: CORS preflight
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cors_preflight_returns_correct_headers() {
    let app = build_test_app(None);
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/streams")
        .header("Origin", "http://localhost:5173")
        .header("Access-Control-Request-Method", "POST")
        .header("Access-Control-Request-Headers", "content-type")
        .body(Body::empty())
        .unwrap();

    let response = send(&app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "http://localhost:5173"
    );
}
