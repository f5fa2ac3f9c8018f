//! Integration tests for `GET /stats`.

mod common;

use axum::http::StatusCode;
use common::{app_with_person_detector, body_json, build_test_app, create_stream, delete, get, submit_frame};
use serde_json::json;

#[tokio::test]
async fn empty_store_reports_zeroes() {
    let app = build_test_app(None);
    let response = get(&app, "/stats").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["active_sessions"], 0);
    assert_eq!(json["total_frames"], 0);
    assert_eq!(json["inference_ready"], false);
    assert_eq!(json["stale"], false);
    assert!(json["generated_at"].is_string());
}

#[tokio::test]
async fn stats_aggregate_across_sessions() {
    let app = app_with_person_detector();
    create_stream(&app, "cam-1", json!({ "frame_sample_rate": 1 })).await;
    create_stream(&app, "cam-2", json!({ "frame_sample_rate": 2 })).await;

    for i in 0..2 {
        assert_eq!(submit_frame(&app, "cam-1", i).await.status(), StatusCode::OK);
        assert_eq!(submit_frame(&app, "cam-2", i).await.status(), StatusCode::OK);
    }
    delete(&app, "/streams/cam-2").await;

    let json = body_json(get(&app, "/stats").await).await;
    assert_eq!(json["active_sessions"], 1);
    assert_eq!(json["stopped_sessions"], 1);
    assert_eq!(json["total_frames"], 4);
    assert_eq!(json["total_sampled_frames"], 3);
    assert_eq!(json["total_detections"], 3);
    assert_eq!(json["inference_ready"], true);
}

#[tokio::test]
async fn store_outage_serves_the_last_snapshot_as_stale() {
    let app = app_with_person_detector();
    create_stream(&app, "cam-1", json!({})).await;

    let fresh = body_json(get(&app, "/stats").await).await;
    assert_eq!(fresh["active_sessions"], 1);

    app.memory.set_available(false);
    let response = get(&app, "/stats").await;
    assert_eq!(response.status(), StatusCode::OK);

    let stale = body_json(response).await;
    assert_eq!(stale["stale"], true);
    assert_eq!(stale["active_sessions"], 1);
}
