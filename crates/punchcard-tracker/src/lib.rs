#![warn(missing_docs)]
//! # punchcard-tracker
//!
//! ## Purpose
//! Orchestrates the time-tracking session lifecycle and periodic capture
//! pipeline for `punchcard`.
//!
//! ## Responsibilities
//! - Own the `Idle`/`Running` session state machine and its persistence.
//! - Probe capture permissions once per session and apply downgrades.
//! - Schedule capture cycles at a fixed period and run one at session start.
//! - Acquire, encode, and upload capture images, then batch-write metadata.
//!
//! ## Data flow
//! `start` -> insert session record -> permission probe -> immediate
//! capture cycle -> scheduler ticks spawn further cycles -> `stop` patches
//! the end time and disarms the scheduler.
//!
//! ## Ownership and lifetimes
//! The tracker owns all mutable session state behind one shared handle;
//! spawned cycles hold cloned `Arc`s and never outlive their usefulness —
//! a cycle finishing after `stop` discards its own metadata.
//!
//! ## Error model
//! Persistence failures surface as [`TrackerError`] and are retryable.
//! Capture and upload failures downgrade the failing kind and are logged;
//! no error crosses the scheduler boundary or stops time tracking.
//!
//! ## Security and privacy notes
//! Image bytes never appear in logs. The `PUNCHCARD_CAPTURE_ENABLED`
//! kill-switch suppresses all captures without touching time tracking.

mod config;
mod lifecycle;
mod pipeline;
mod scheduler;

pub use config::{
    CAPTURE_BUCKET_ENV, CAPTURE_ENABLED_ENV, CAPTURE_INTERVAL_ENV, DEFAULT_CAPTURE_BUCKET,
    DEFAULT_CAPTURE_INTERVAL_SECS, DEFAULT_JPEG_QUALITY, TrackerConfig, capture_enabled_from_env,
};
pub use lifecycle::{TimeTracker, TrackerState};
pub use pipeline::{CycleOutcome, CycleRequest, capture_cycle, encode_jpeg};
pub use scheduler::CaptureScheduler;

use thiserror::Error;

/// Build-time application version loaded from root `VERSION` file.
pub const APP_VERSION: &str = env!("PUNCHCARD_VERSION");

/// Returns the app version sourced from root `VERSION`.
pub fn app_version() -> &'static str {
    APP_VERSION
}

/// Tracker orchestration error type.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Configuration or identifier validation failure.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A session is already running in this tracker.
    #[error("a session is already running")]
    SessionAlreadyRunning,
    /// Persistence holds an open session for this user.
    #[error("an open session '{0}' already exists")]
    OpenSessionExists(String),
    /// Persistence layer failure; the operation may be retried.
    #[error("persistence failure: {0}")]
    Persistence(#[from] punchcard_store::StoreError),
    /// Blob storage failure.
    #[error("storage failure: {0}")]
    Storage(#[from] punchcard_blob::BlobError),
    /// Capture device failure or denial.
    #[error("capture failure: {0}")]
    Capture(#[from] punchcard_capture::CaptureError),
    /// JPEG encoding failure.
    #[error("jpeg encode failure: {0}")]
    Encode(String),
    /// Core model validation or record codec failure.
    #[error("record failure: {0}")]
    Record(#[from] punchcard_core::CoreError),
}
