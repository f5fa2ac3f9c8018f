mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use chrono::Utc;
use common::{
    detection, harness, png_b64, test_settings, FailingDetector, FixedDetector, ScriptedDetector,
};
use sentinel_core::error::CoreError;
use sentinel_core::frame::MAX_FRAME_INDEX;
use sentinel_core::session::SessionConfig;
use sentinel_core::store::{LeaseStore, SessionStore};
use sentinel_pipeline::lease::clip_lock_key;
use sentinel_pipeline::PipelineError;

fn config(frame_sample_rate: u32) -> SessionConfig {
    SessionConfig {
        frame_sample_rate,
        ..SessionConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sample_rate_ten_samples_only_multiples_of_ten() {
    let h = harness(
        test_settings(),
        Some(Arc::new(FixedDetector(vec![detection("person", 0.9)]))),
    );
    h.lifecycle
        .create_session(Some("cam-1".into()), config(10), Utc::now())
        .await
        .unwrap();

    let frame = png_b64(120, 120);
    let mut sampled = Vec::new();
    for index in 0..10 {
        let report = h.processor.process("cam-1", index, &frame).await.unwrap();
        if report.sampled {
            sampled.push(index);
        } else {
            assert!(report.detections.is_none());
        }
    }
    assert_eq!(sampled, vec![0]);

    let session = h.store.get_session("cam-1").await.unwrap().unwrap();
    assert_eq!(session.frame_count, 10);
    assert_eq!(session.sampled_count, 1);
    assert_eq!(session.detection_count, 1);
}

#[tokio::test]
async fn sample_rate_one_samples_every_frame() {
    let h = harness(test_settings(), Some(Arc::new(FixedDetector(vec![]))));
    h.lifecycle
        .create_session(Some("cam-1".into()), config(1), Utc::now())
        .await
        .unwrap();

    let frame = png_b64(120, 120);
    for index in 0..4 {
        assert!(h.processor.process("cam-1", index, &frame).await.unwrap().sampled);
    }
}

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_frames_lose_no_counter_updates() {
    let h = harness(
        test_settings(),
        Some(Arc::new(FixedDetector(vec![
            detection("person", 0.9),
            detection("car", 0.6),
            detection("dog", 0.2),
        ]))),
    );
    h.lifecycle
        .create_session(Some("cam-1".into()), config(2), Utc::now())
        .await
        .unwrap();

    let frame = Arc::new(png_b64(120, 120));
    let tasks: Vec<_> = (0..40u64)
        .map(|index| {
            let processor = Arc::clone(&h.processor);
            let frame = Arc::clone(&frame);
            tokio::spawn(async move { processor.process("cam-1", index, &frame).await })
        })
        .collect();

    let mut accepted = 0u64;
    for task in futures::future::join_all(tasks).await {
        let report = task.unwrap().unwrap();
        accepted += report.detections.map(|d| d.len() as u64).unwrap_or(0);
    }

    let session = h.store.get_session("cam-1").await.unwrap().unwrap();
    assert_eq!(session.frame_count, 40);
    assert_eq!(session.sampled_count, 20);
    assert_eq!(accepted, 40);
    assert_eq!(session.detection_count, accepted);
}

// ---------------------------------------------------------------------------
// Rejections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn malformed_frame_is_rejected_before_admission() {
    let h = harness(test_settings(), Some(Arc::new(FixedDetector(vec![]))));
    h.lifecycle
        .create_session(Some("cam-1".into()), config(1), Utc::now())
        .await
        .unwrap();

    assert_matches!(
        h.processor.process("cam-1", 0, "%%%").await,
        Err(PipelineError::Core(CoreError::Validation(_)))
    );
    assert_matches!(
        h.processor.process("cam-1", 0, &png_b64(50, 50)).await,
        Err(PipelineError::Core(CoreError::Validation(_)))
    );
    let session = h.store.get_session("cam-1").await.unwrap().unwrap();
    assert_eq!(session.frame_count, 0);
}

#[tokio::test]
async fn unknown_and_stopped_sessions_reject_frames() {
    let h = harness(test_settings(), Some(Arc::new(FixedDetector(vec![]))));
    let frame = png_b64(120, 120);

    assert_matches!(
        h.processor.process("missing", 0, &frame).await,
        Err(PipelineError::Core(CoreError::NotFound { .. }))
    );

    h.lifecycle
        .create_session(Some("cam-1".into()), config(1), Utc::now())
        .await
        .unwrap();
    h.lifecycle.stop_session("cam-1", Utc::now()).await.unwrap();

    assert_matches!(
        h.processor.process("cam-1", 1, &frame).await,
        Err(PipelineError::Core(CoreError::SessionStopped(_)))
    );
    let session = h.store.get_session("cam-1").await.unwrap().unwrap();
    assert_eq!(session.frame_count, 0);
}

// ---------------------------------------------------------------------------
// Inference failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unavailable_inference_rejects_sampled_frames_only() {
    let h = harness(test_settings(), None);
    h.lifecycle
        .create_session(Some("cam-1".into()), config(2), Utc::now())
        .await
        .unwrap();
    let frame = png_b64(120, 120);

    assert_matches!(
        h.processor.process("cam-1", 0, &frame).await,
        Err(PipelineError::InferenceUnavailable(_))
    );
    assert!(!h.processor.process("cam-1", 1, &frame).await.unwrap().sampled);

    h.inference.install(Arc::new(FailingDetector { unavailable: true }));
    assert_matches!(
        h.processor.process("cam-1", 2, &frame).await,
        Err(PipelineError::InferenceUnavailable(_))
    );
}

#[tokio::test]
async fn failed_inference_skips_the_frame() {
    let h = harness(
        test_settings(),
        Some(Arc::new(FailingDetector { unavailable: false })),
    );
    h.lifecycle
        .create_session(Some("cam-1".into()), config(1), Utc::now())
        .await
        .unwrap();

    let report = h
        .processor
        .process("cam-1", 0, &png_b64(120, 120))
        .await
        .unwrap();
    assert!(report.sampled);
    assert_eq!(report.detections, Some(vec![]));
    assert!(report.inference_error.is_some());

    let session = h.store.get_session("cam-1").await.unwrap().unwrap();
    assert_eq!(session.sampled_count, 1);
    assert_eq!(session.detection_count, 0);
}

#[tokio::test]
async fn index_beyond_bigint_range_is_rejected() {
    let h = harness(test_settings(), Some(Arc::new(FixedDetector(vec![]))));
    h.lifecycle
        .create_session(Some("cam-1".into()), config(1), Utc::now())
        .await
        .unwrap();

    let result = h
        .processor
        .process("cam-1", MAX_FRAME_INDEX + 1, &png_b64(120, 120))
        .await;
    assert_matches!(result, Err(PipelineError::Core(CoreError::Validation(_))));

    let session = h.store.get_session("cam-1").await.unwrap().unwrap();
    assert_eq!(session.frame_count, 0);
}

// ---------------------------------------------------------------------------
// Clip stage
// ---------------------------------------------------------------------------

fn recording_config() -> SessionConfig {
    SessionConfig {
        frame_sample_rate: 1,
        enable_clip_recording: true,
        ..SessionConfig::default()
    }
}

#[tokio::test]
async fn non_qualifying_frame_continues_an_open_window() {
    let script = HashMap::from([(2, vec![detection("person", 0.9)])]);
    let h = harness(test_settings(), Some(Arc::new(ScriptedDetector(script))));
    h.lifecycle
        .create_session(Some("cam-1".into()), recording_config(), Utc::now())
        .await
        .unwrap();
    let frame = png_b64(120, 120);

    let first = h.processor.process("cam-1", 1, &frame).await.unwrap();
    assert!(first.sampled);
    assert_eq!(first.detections, Some(vec![]));
    assert!(first.clip.is_none());

    let second = h.processor.process("cam-1", 2, &frame).await.unwrap();
    assert_eq!(second.detection_count, Some(1));
    let opened = second.clip.expect("qualifying frame opens a window");
    assert!(opened.opened);
    assert_eq!(opened.frame_count, Some(1));

    let third = h.processor.process("cam-1", 3, &frame).await.unwrap();
    assert_eq!(third.detections, Some(vec![]));
    let appended = third.clip.expect("open window takes the frame");
    assert!(!appended.opened);
    assert_eq!(appended.window_id, opened.window_id);
    assert_eq!(appended.frame_count, Some(2));

    let session = h.store.get_session("cam-1").await.unwrap().unwrap();
    assert_eq!(session.sampled_count, 3);
    assert_eq!(session.detection_count, 1);
}

#[tokio::test]
async fn clip_failure_after_counting_keeps_the_frame_counted() {
    let mut settings = test_settings();
    settings.clip_lease.acquire_timeout = Duration::from_millis(50);
    let h = harness(
        settings,
        Some(Arc::new(FixedDetector(vec![detection("person", 0.9)]))),
    );
    h.lifecycle
        .create_session(Some("cam-1".into()), recording_config(), Utc::now())
        .await
        .unwrap();
    assert!(h
        .store
        .try_acquire(&clip_lock_key("cam-1"), "other-worker", Duration::from_secs(30))
        .await
        .unwrap());

    let report = h
        .processor
        .process("cam-1", 0, &png_b64(120, 120))
        .await
        .unwrap();
    assert!(report.sampled);
    assert_eq!(report.detection_count, Some(1));
    assert!(report.clip.is_none());
    assert!(report.clip_error.unwrap().contains("clip:cam-1"));

    let session = h.store.get_session("cam-1").await.unwrap().unwrap();
    assert_eq!(session.sampled_count, 1);
    assert_eq!(session.detection_count, 1);
}
