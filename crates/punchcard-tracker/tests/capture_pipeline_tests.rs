//! Integration tests for the acquire/encode/upload capture pipeline.

mod common;

use chrono::{SecondsFormat, TimeZone, Utc};
use common::Harness;
use punchcard_core::{CAPTURES_COLLECTION, CaptureKind, PermissionState};
use punchcard_tracker::{CycleRequest, TrackerState, capture_cycle};

fn full_permissions() -> PermissionState {
    PermissionState {
        screen_allowed: true,
        webcam_allowed: true,
    }
}

#[tokio::test]
async fn cycle_captures_share_one_timestamp_and_path_layout() {
    let harness = Harness::new();
    let taken_at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 5, 0).unwrap();

    let outcome = capture_cycle(
        harness.blobs.as_ref(),
        harness.device.as_ref(),
        CycleRequest {
            user_id: "user-1",
            session_id: "session-1",
            bucket: "captures",
            jpeg_quality: 80,
            permissions: full_permissions(),
            taken_at,
        },
    )
    .await;

    assert_eq!(outcome.taken_at, taken_at);
    assert!(outcome.downgraded.is_empty());
    assert_eq!(outcome.uploaded.len(), 2);

    let stamp = taken_at.to_rfc3339_opts(SecondsFormat::Secs, true);
    for (capture, kind) in outcome.uploaded.iter().zip(CaptureKind::ALL) {
        assert_eq!(capture.kind, kind);
        assert_eq!(capture.taken_at, taken_at);
        assert_eq!(
            capture.storage_path,
            format!("user-1/session-1/{kind}_{stamp}.jpg")
        );
        let bytes = harness
            .blobs
            .object("captures", &capture.storage_path)
            .expect("uploaded object should exist");
        // JPEG SOI marker.
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }
}

#[tokio::test]
async fn upload_failure_downgrades_the_failing_kind_only() {
    let harness = Harness::new();
    harness.blobs.fail_uploads_containing("screen_");

    let outcome = capture_cycle(
        harness.blobs.as_ref(),
        harness.device.as_ref(),
        CycleRequest {
            user_id: "user-1",
            session_id: "session-1",
            bucket: "captures",
            jpeg_quality: 80,
            permissions: full_permissions(),
            taken_at: Utc::now(),
        },
    )
    .await;

    assert_eq!(outcome.downgraded, vec![CaptureKind::Screen]);
    assert_eq!(outcome.uploaded.len(), 1);
    assert_eq!(outcome.uploaded[0].kind, CaptureKind::Webcam);
    assert_eq!(harness.blobs.object_count(), 1);
}

#[tokio::test]
async fn denied_kind_is_skipped_without_downgrade() {
    let harness = Harness::new();

    let outcome = capture_cycle(
        harness.blobs.as_ref(),
        harness.device.as_ref(),
        CycleRequest {
            user_id: "user-1",
            session_id: "session-1",
            bucket: "captures",
            jpeg_quality: 80,
            permissions: PermissionState {
                screen_allowed: false,
                webcam_allowed: true,
            },
            taken_at: Utc::now(),
        },
    )
    .await;

    assert!(outcome.downgraded.is_empty());
    assert_eq!(outcome.uploaded.len(), 1);
    assert_eq!(outcome.uploaded[0].kind, CaptureKind::Webcam);
}

#[tokio::test]
async fn start_with_all_permissions_denied_tracks_without_captures() {
    let harness = Harness::new();
    harness.device.deny(CaptureKind::Screen);
    harness.device.deny(CaptureKind::Webcam);
    let mut tracker = harness.tracker("user-1");

    tracker
        .start(Utc::now(), None)
        .await
        .expect("start should succeed without capture permission");

    assert!(matches!(tracker.state(), TrackerState::Running(_)));
    assert!(!tracker.scheduler_armed());
    assert_eq!(tracker.permissions(), PermissionState::none());
    assert_eq!(harness.blobs.object_count(), 0);
    assert_eq!(harness.store.record_count(CAPTURES_COLLECTION), 0);
}

#[tokio::test]
async fn immediate_cycle_records_captures_and_sticks_downgrades() {
    let harness = Harness::new();
    // Webcam source fails from the first acquisition, like an unplugged camera.
    harness.device.fail_acquisitions_after(CaptureKind::Webcam, 0);
    let mut tracker = harness.tracker("user-1");

    tracker
        .start(Utc::now(), None)
        .await
        .expect("start should succeed");
    // The immediate cycle runs detached; let it finish.
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }

    assert_eq!(harness.blobs.object_count(), 1);
    assert_eq!(harness.store.record_count(CAPTURES_COLLECTION), 1);
    let permissions = tracker.permissions();
    assert!(permissions.screen_allowed);
    assert!(!permissions.webcam_allowed);
    assert!(tracker.scheduler_armed());
}
