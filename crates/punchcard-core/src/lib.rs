#![warn(missing_docs)]
//! # punchcard-core
//!
//! ## Purpose
//! Defines the pure data model used across the `punchcard` workspace.
//!
//! ## Responsibilities
//! - Represent time-tracking sessions and capture metadata records.
//! - Derive deterministic blob storage paths for uploaded captures.
//! - Format elapsed session time for display.
//! - Model transient per-session capture permission state.
//!
//! ## Data flow
//! The lifecycle manager creates a [`Session`] when tracking starts. Each
//! capture cycle produces [`Capture`] records addressed by
//! [`capture_storage_path`], and the device layer hands raw [`Frame`] buffers
//! to the pipeline for encoding.
//!
//! ## Ownership and lifetimes
//! All model types own their backing data (`String`, `Vec<u8>`) so records
//! can cross async task boundaries without borrow coupling.
//!
//! ## Error model
//! Validation failures (frame shape, blank identifiers) and record codec
//! failures return [`CoreError`] variants.
//!
//! ## Security and privacy notes
//! This crate never logs frame bytes. Session and user identifiers are
//! treated as opaque values.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Store collection holding session records.
pub const SESSIONS_COLLECTION: &str = "time_entries";

/// Store collection holding capture metadata records.
pub const CAPTURES_COLLECTION: &str = "captures";

/// Image source for one capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureKind {
    /// Full-screen still image.
    Screen,
    /// Webcam still image.
    Webcam,
}

impl CaptureKind {
    /// Returns the stable lowercase label used in storage paths and records.
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureKind::Screen => "screen",
            CaptureKind::Webcam => "webcam",
        }
    }

    /// Both capture kinds in pipeline order.
    pub const ALL: [CaptureKind; 2] = [CaptureKind::Screen, CaptureKind::Webcam];
}

impl std::fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One contiguous tracked-time interval for a user.
///
/// A session with `end_time == None` is open. At most one session per user
/// may be open at a time; the lifecycle manager upholds this by querying for
/// an open session before inserting a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Record identifier assigned at creation.
    pub id: String,
    /// Owning user identifier.
    pub user_id: String,
    /// When tracking started.
    pub start_time: DateTime<Utc>,
    /// When tracking stopped; `None` while the session is open.
    pub end_time: Option<DateTime<Utc>>,
    /// Optional free-form description entered by the user.
    pub description: Option<String>,
}

impl Session {
    /// Returns `true` while `end_time` is unset.
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    /// Serializes the session into a generic store record.
    ///
    /// # Errors
    /// Returns [`CoreError::Codec`] when serialization fails.
    pub fn to_record(&self) -> Result<serde_json::Value, CoreError> {
        serde_json::to_value(self).map_err(CoreError::Codec)
    }

    /// Deserializes a session from a generic store record.
    ///
    /// # Errors
    /// Returns [`CoreError::Codec`] when the record shape does not match.
    pub fn from_record(record: serde_json::Value) -> Result<Self, CoreError> {
        serde_json::from_value(record).map_err(CoreError::Codec)
    }
}

/// Metadata for one uploaded capture image.
///
/// Created only after the corresponding blob upload succeeded, so no record
/// ever references a missing blob. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capture {
    /// Record identifier assigned at creation.
    pub id: String,
    /// Parent session identifier (referenced, not owned).
    pub session_id: String,
    /// Deterministic blob path produced by [`capture_storage_path`].
    pub storage_path: String,
    /// Shared cycle timestamp; captures from one cycle carry the same value.
    pub taken_at: DateTime<Utc>,
    /// Image source.
    pub kind: CaptureKind,
}

impl Capture {
    /// Serializes the capture into a generic store record.
    ///
    /// # Errors
    /// Returns [`CoreError::Codec`] when serialization fails.
    pub fn to_record(&self) -> Result<serde_json::Value, CoreError> {
        serde_json::to_value(self).map_err(CoreError::Codec)
    }

    /// Deserializes a capture from a generic store record.
    ///
    /// # Errors
    /// Returns [`CoreError::Codec`] when the record shape does not match.
    pub fn from_record(record: serde_json::Value) -> Result<Self, CoreError> {
        serde_json::from_value(record).map_err(CoreError::Codec)
    }
}

/// Transient per-session capture permission flags.
///
/// Derived once at session start and never re-probed; a capture failure
/// downgrades the failing kind for the remainder of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionState {
    /// Screen capture is currently permitted.
    pub screen_allowed: bool,
    /// Webcam capture is currently permitted.
    pub webcam_allowed: bool,
}

impl PermissionState {
    /// State with both kinds denied.
    pub fn none() -> Self {
        Self {
            screen_allowed: false,
            webcam_allowed: false,
        }
    }

    /// Returns `true` when the given kind is permitted.
    pub fn allows(&self, kind: CaptureKind) -> bool {
        match kind {
            CaptureKind::Screen => self.screen_allowed,
            CaptureKind::Webcam => self.webcam_allowed,
        }
    }

    /// Returns `true` when at least one kind is permitted.
    pub fn any_granted(&self) -> bool {
        self.screen_allowed || self.webcam_allowed
    }

    /// Marks one kind as denied for the rest of the session.
    pub fn downgrade(&mut self, kind: CaptureKind) {
        match kind {
            CaptureKind::Screen => self.screen_allowed = false,
            CaptureKind::Webcam => self.webcam_allowed = false,
        }
    }
}

/// One raw still image produced by a capture device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// RGBA pixel buffer (`width * height * 4` bytes).
    pub rgba: Vec<u8>,
}

impl Frame {
    /// Constructs a validated frame.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidFrameShape`] when the pixel buffer length
    /// is not exactly `width * height * 4`.
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, CoreError> {
        let expected = required_rgba_len(width, height)?;
        if rgba.len() != expected {
            return Err(CoreError::InvalidFrameShape {
                expected,
                actual: rgba.len(),
            });
        }

        Ok(Self {
            width,
            height,
            rgba,
        })
    }
}

/// Derives the deterministic blob path for one capture.
///
/// # Semantics
/// `{user_id}/{session_id}/{kind}_{iso8601}.jpg`. The shared cycle timestamp
/// keeps same-cycle captures correlated, and the path is unique per user,
/// session, kind, and moment.
///
/// # Errors
/// Returns [`CoreError::BlankIdentifier`] when either identifier is blank.
pub fn capture_storage_path(
    user_id: &str,
    session_id: &str,
    kind: CaptureKind,
    taken_at: DateTime<Utc>,
) -> Result<String, CoreError> {
    if user_id.trim().is_empty() {
        return Err(CoreError::BlankIdentifier("user_id"));
    }
    if session_id.trim().is_empty() {
        return Err(CoreError::BlankIdentifier("session_id"));
    }

    let stamp = taken_at.to_rfc3339_opts(SecondsFormat::Secs, true);
    Ok(format!("{user_id}/{session_id}/{kind}_{stamp}.jpg"))
}

/// Formats elapsed time between `start` and `now` as zero-padded `HH:MM:SS`.
///
/// Whole seconds are floored; hours widen past two digits when needed. A
/// `now` earlier than `start` clamps to `00:00:00`.
pub fn format_elapsed(start: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let total = (now - start).num_seconds().max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Error type for core model validation and codec failures.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Frame buffer length does not match declared geometry.
    #[error("invalid frame shape: expected {expected} bytes, got {actual}")]
    InvalidFrameShape {
        /// Expected RGBA byte count.
        expected: usize,
        /// Actual RGBA byte count.
        actual: usize,
    },
    /// Frame width times height does not fit in memory.
    #[error("frame dimensions overflow")]
    FrameDimensionsOverflow,
    /// An identifier required for path derivation is blank.
    #[error("{0} must be non-empty")]
    BlankIdentifier(&'static str),
    /// Record encoding/decoding error.
    #[error("record codec failure: {0}")]
    Codec(#[from] serde_json::Error),
}

fn required_rgba_len(width: u32, height: u32) -> Result<usize, CoreError> {
    let pixels = (width as usize)
        .checked_mul(height as usize)
        .ok_or(CoreError::FrameDimensionsOverflow)?;

    pixels
        .checked_mul(4)
        .ok_or(CoreError::FrameDimensionsOverflow)
}
