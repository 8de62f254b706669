#![warn(missing_docs)]
//! # punchcard-capture
//!
//! ## Purpose
//! Provides the capture device abstraction: permission probing and still
//! frame acquisition for screen and webcam sources.
//!
//! ## Responsibilities
//! - Define a backend-agnostic capture device trait.
//! - Expose a deterministic synthetic device for CI and unit tests, with
//!   injectable per-kind denial and acquisition failures.
//!
//! ## Data flow
//! The lifecycle manager probes both kinds once at session start; each
//! capture cycle acquires [`punchcard_core::Frame`] stills from the granted
//! kinds and feeds them to the encode/upload pipeline.
//!
//! ## Ownership and lifetimes
//! Acquired frames own their buffers; no device memory escapes the backend
//! boundary.
//!
//! ## Error model
//! Denied or failed acquisitions are reported as [`CaptureError`] values.
//! Probing never errors: denial maps to `false`.
//!
//! ## Security and privacy notes
//! Probe checks release any acquired media stream immediately; no frame
//! bytes are retained or logged by this crate.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use punchcard_core::{CaptureKind, Frame};
use thiserror::Error;

/// Trait implemented by concrete capture providers.
pub trait CaptureDevice: Send + Sync + 'static {
    /// Attempts to acquire (and immediately release) a stream of the given
    /// kind, reporting whether access is currently granted.
    ///
    /// Never errors; any denial or backend failure maps to `false`.
    fn probe(&self, kind: CaptureKind) -> bool;

    /// Acquires one still frame from the given kind.
    ///
    /// # Errors
    /// Returns [`CaptureError::PermissionDenied`] when access is refused and
    /// [`CaptureError::Backend`] for device-level failures.
    fn acquire_frame(
        &self,
        kind: CaptureKind,
        taken_at: DateTime<Utc>,
    ) -> Result<Frame, CaptureError>;
}

/// Deterministic synthetic device for test and CI usage.
///
/// # Notes
/// Mirrors real device behavior closely enough for lifecycle tests: per-kind
/// permission flags, a monotone pixel sequence so consecutive frames differ,
/// and an optional failure budget that makes acquisitions for one kind start
/// failing after a set number of successes.
#[derive(Debug)]
pub struct SyntheticCaptureDevice {
    state: Mutex<SyntheticState>,
}

#[derive(Debug)]
struct SyntheticState {
    screen: KindState,
    webcam: KindState,
    sequence: u64,
}

#[derive(Debug)]
struct KindState {
    allowed: bool,
    failures_after: Option<u32>,
    acquisitions: u32,
}

impl KindState {
    fn granted() -> Self {
        Self {
            allowed: true,
            failures_after: None,
            acquisitions: 0,
        }
    }
}

/// Synthetic frame edge length in pixels.
const SYNTHETIC_FRAME_SIDE: u32 = 4;

impl SyntheticCaptureDevice {
    /// Creates a device with both kinds granted.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SyntheticState {
                screen: KindState::granted(),
                webcam: KindState::granted(),
                sequence: 0,
            }),
        }
    }

    /// Denies the given kind at probe and acquisition time.
    pub fn deny(&self, kind: CaptureKind) {
        let mut state = self.lock_state();
        kind_state(&mut state, kind).allowed = false;
    }

    /// Makes acquisitions for `kind` fail after `successes` successful calls.
    ///
    /// Probing is unaffected, modeling a source that disappears mid-session
    /// (for example an unplugged camera).
    pub fn fail_acquisitions_after(&self, kind: CaptureKind, successes: u32) {
        let mut state = self.lock_state();
        kind_state(&mut state, kind).failures_after = Some(successes);
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SyntheticState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SyntheticCaptureDevice {
    fn default() -> Self {
        Self::new()
    }
}

fn kind_state(state: &mut SyntheticState, kind: CaptureKind) -> &mut KindState {
    match kind {
        CaptureKind::Screen => &mut state.screen,
        CaptureKind::Webcam => &mut state.webcam,
    }
}

impl CaptureDevice for SyntheticCaptureDevice {
    fn probe(&self, kind: CaptureKind) -> bool {
        let mut state = self.lock_state();
        kind_state(&mut state, kind).allowed
    }

    fn acquire_frame(
        &self,
        kind: CaptureKind,
        _taken_at: DateTime<Utc>,
    ) -> Result<Frame, CaptureError> {
        let mut state = self.lock_state();
        state.sequence += 1;
        let byte = (state.sequence % 255) as u8;

        let slot = kind_state(&mut state, kind);
        if !slot.allowed {
            return Err(CaptureError::PermissionDenied(kind));
        }
        if let Some(budget) = slot.failures_after
            && slot.acquisitions >= budget
        {
            return Err(CaptureError::Backend(format!(
                "synthetic {kind} source stopped responding"
            )));
        }
        slot.acquisitions += 1;

        let side = SYNTHETIC_FRAME_SIDE;
        let rgba = vec![byte; (side as usize) * (side as usize) * 4];
        Frame::new(side, side, rgba).map_err(|error| CaptureError::Backend(error.to_string()))
    }
}

/// Capture layer error type.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Access to the given kind was refused.
    #[error("{0} capture permission denied")]
    PermissionDenied(CaptureKind),
    /// Device-level acquisition failure.
    #[error("capture backend failure: {0}")]
    Backend(String),
}
