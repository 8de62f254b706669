//! Tests for deterministic capture storage path derivation.

use chrono::{DateTime, Utc};
use punchcard_core::{CaptureKind, CoreError, capture_storage_path};

fn at(rfc3339: &str) -> DateTime<Utc> {
    rfc3339
        .parse()
        .expect("test timestamp should parse as RFC 3339")
}

#[test]
fn derives_user_session_kind_timestamp_layout() {
    let taken_at = at("2024-01-01T00:00:00Z");
    let path = capture_storage_path("user-7", "session-42", CaptureKind::Screen, taken_at)
        .expect("path should derive");
    assert_eq!(path, "user-7/session-42/screen_2024-01-01T00:00:00Z.jpg");

    let webcam = capture_storage_path("user-7", "session-42", CaptureKind::Webcam, taken_at)
        .expect("path should derive");
    assert_eq!(webcam, "user-7/session-42/webcam_2024-01-01T00:00:00Z.jpg");
}

#[test]
fn same_cycle_kinds_share_the_timestamp_segment() {
    let taken_at = at("2024-06-15T09:30:05Z");
    let screen = capture_storage_path("u", "s", CaptureKind::Screen, taken_at).unwrap();
    let webcam = capture_storage_path("u", "s", CaptureKind::Webcam, taken_at).unwrap();

    let screen_stamp = screen
        .rsplit_once('_')
        .map(|(_, stamp)| stamp)
        .expect("screen path should contain timestamp");
    let webcam_stamp = webcam
        .rsplit_once('_')
        .map(|(_, stamp)| stamp)
        .expect("webcam path should contain timestamp");
    assert_eq!(screen_stamp, webcam_stamp);
}

#[test]
fn different_moments_produce_different_paths() {
    let first = capture_storage_path(
        "u",
        "s",
        CaptureKind::Screen,
        at("2024-01-01T00:00:00Z"),
    )
    .unwrap();
    let second = capture_storage_path(
        "u",
        "s",
        CaptureKind::Screen,
        at("2024-01-01T00:05:00Z"),
    )
    .unwrap();
    assert_ne!(first, second);
}

#[test]
fn rejects_blank_identifiers() {
    let taken_at = at("2024-01-01T00:00:00Z");
    assert!(matches!(
        capture_storage_path("", "s", CaptureKind::Screen, taken_at),
        Err(CoreError::BlankIdentifier("user_id"))
    ));
    assert!(matches!(
        capture_storage_path("u", "  ", CaptureKind::Webcam, taken_at),
        Err(CoreError::BlankIdentifier("session_id"))
    ));
}
