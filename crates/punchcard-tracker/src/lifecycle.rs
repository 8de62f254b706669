//! Session lifecycle manager.
//!
//! Owns the single `Idle`/`Running` session state machine, the permission
//! snapshot, and the capture scheduler. All state mutation happens through
//! this module; spawned cycles see it only through the shared handle.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use punchcard_blob::BlobStore;
use punchcard_capture::CaptureDevice;
use punchcard_core::{
    CaptureKind, PermissionState, SESSIONS_COLLECTION, Session, format_elapsed,
};
use punchcard_store::{Query, RecordStore};
use uuid::Uuid;

use crate::TrackerError;
use crate::config::{TrackerConfig, capture_enabled_from_env};
use crate::scheduler::{CaptureScheduler, CycleDeps, run_cycle};

/// Mutable state shared with in-flight capture cycles.
#[derive(Debug)]
pub(crate) struct TrackerShared {
    /// The open session, when one exists.
    pub session: Option<Session>,
    /// Per-session capture permission flags.
    pub permissions: PermissionState,
}

/// Locks shared tracker state, recovering from a poisoned lock.
///
/// Guards must never be held across an await.
pub(crate) fn lock_shared(shared: &Mutex<TrackerShared>) -> MutexGuard<'_, TrackerShared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Lifecycle state snapshot for callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerState {
    /// No session is running.
    Idle,
    /// A session is open.
    Running(Session),
}

/// Owns one user's time-tracking session lifecycle.
///
/// Generic over the persistence store, blob store, and capture device so
/// tests and the demo binary can wire deterministic in-memory collaborators.
pub struct TimeTracker<S, B, C> {
    store: Arc<S>,
    blobs: Arc<B>,
    device: Arc<C>,
    config: TrackerConfig,
    user_id: String,
    shared: Arc<Mutex<TrackerShared>>,
    scheduler: CaptureScheduler,
}

impl<S, B, C> TimeTracker<S, B, C>
where
    S: RecordStore,
    B: BlobStore,
    C: CaptureDevice,
{
    /// Creates an idle tracker for one user.
    ///
    /// # Errors
    /// Returns [`TrackerError::InvalidConfig`] when `user_id` is blank.
    pub fn new(
        user_id: impl Into<String>,
        config: TrackerConfig,
        store: Arc<S>,
        blobs: Arc<B>,
        device: Arc<C>,
    ) -> Result<Self, TrackerError> {
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(TrackerError::InvalidConfig(
                "user id must be non-empty".to_string(),
            ));
        }

        Ok(Self {
            store,
            blobs,
            device,
            config,
            user_id,
            shared: Arc::new(Mutex::new(TrackerShared {
                session: None,
                permissions: PermissionState::none(),
            })),
            scheduler: CaptureScheduler::new(),
        })
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> TrackerState {
        match lock_shared(&self.shared).session.clone() {
            Some(session) => TrackerState::Running(session),
            None => TrackerState::Idle,
        }
    }

    /// Returns the current permission snapshot.
    pub fn permissions(&self) -> PermissionState {
        lock_shared(&self.shared).permissions
    }

    /// Returns `true` while the capture scheduler timer is running.
    pub fn scheduler_armed(&self) -> bool {
        self.scheduler.is_armed()
    }

    /// Formats elapsed time of the open session, for display only.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Option<String> {
        lock_shared(&self.shared)
            .session
            .as_ref()
            .map(|session| format_elapsed(session.start_time, now))
    }

    /// Reconciles local state with persistence after a restart.
    ///
    /// Queries for this user's open session; when one exists, transitions to
    /// `Running`, re-probes permissions, and re-arms the scheduler without
    /// an immediate cycle.
    ///
    /// # Errors
    /// Returns [`TrackerError::Persistence`] when the query fails; local
    /// state is left untouched.
    pub async fn resume_open_session(&mut self) -> Result<Option<Session>, TrackerError> {
        if lock_shared(&self.shared).session.is_some() {
            return Err(TrackerError::SessionAlreadyRunning);
        }

        let Some(session) = self.query_open_session().await? else {
            return Ok(None);
        };

        let permissions = self.probe_permissions();
        {
            let mut shared = lock_shared(&self.shared);
            shared.session = Some(session.clone());
            shared.permissions = permissions;
        }
        tracing::info!(
            session_id = %session.id,
            user_id = %self.user_id,
            "recovered open session from persistence"
        );

        if permissions.any_granted() {
            self.scheduler
                .arm(self.config.capture_interval, self.cycle_deps(&session.id));
        }

        Ok(Some(session))
    }

    /// Starts a new session at `now`.
    ///
    /// Upholds the one-open-session invariant by checking local state and
    /// querying persistence before inserting. On success, probes both
    /// capture permissions once and, when at least one is granted, spawns
    /// one immediate capture cycle and arms the scheduler.
    ///
    /// # Errors
    /// Returns [`TrackerError::SessionAlreadyRunning`] or
    /// [`TrackerError::OpenSessionExists`] when a session is already open,
    /// and [`TrackerError::Persistence`] when the insert fails — the state
    /// stays `Idle` and `start` may be retried.
    pub async fn start(
        &mut self,
        now: DateTime<Utc>,
        description: Option<String>,
    ) -> Result<Session, TrackerError> {
        if lock_shared(&self.shared).session.is_some() {
            return Err(TrackerError::SessionAlreadyRunning);
        }
        if let Some(existing) = self.query_open_session().await? {
            return Err(TrackerError::OpenSessionExists(existing.id));
        }

        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id: self.user_id.clone(),
            start_time: now,
            end_time: None,
            description,
        };
        let stored = self
            .store
            .insert(SESSIONS_COLLECTION, session.to_record()?)
            .await?;
        let session = Session::from_record(stored)?;

        let permissions = self.probe_permissions();
        {
            let mut shared = lock_shared(&self.shared);
            shared.session = Some(session.clone());
            shared.permissions = permissions;
        }
        tracing::info!(
            session_id = %session.id,
            user_id = %self.user_id,
            screen = permissions.screen_allowed,
            webcam = permissions.webcam_allowed,
            "session started"
        );

        if permissions.any_granted() {
            let deps = self.cycle_deps(&session.id);
            // Detached like tick cycles: a hung acquisition or upload stalls
            // that cycle only, never `start` or the timer.
            tokio::spawn(run_cycle(deps.clone(), now));
            self.scheduler.arm(self.config.capture_interval, deps);
        } else {
            tracing::info!(
                session_id = %session.id,
                "no capture permission granted; tracking continues without captures"
            );
        }

        Ok(session)
    }

    /// Stops the open session at `now`.
    ///
    /// A no-op returning `Ok(None)` when idle. On success, disarms the
    /// scheduler and returns the closed session.
    ///
    /// # Errors
    /// Returns [`TrackerError::Persistence`] when the end-time update fails;
    /// the session stays `Running` and `stop` may be retried.
    pub async fn stop(&mut self, now: DateTime<Utc>) -> Result<Option<Session>, TrackerError> {
        let Some(session) = lock_shared(&self.shared).session.clone() else {
            tracing::info!(user_id = %self.user_id, "stop ignored; no session running");
            return Ok(None);
        };

        let stored = self
            .store
            .update(
                SESSIONS_COLLECTION,
                &session.id,
                serde_json::json!({ "end_time": now }),
            )
            .await?;
        let closed = Session::from_record(stored)?;

        self.scheduler.disarm();
        {
            let mut shared = lock_shared(&self.shared);
            shared.session = None;
            shared.permissions = PermissionState::none();
        }
        tracing::info!(
            session_id = %closed.id,
            user_id = %self.user_id,
            elapsed = %format_elapsed(closed.start_time, now),
            "session stopped"
        );

        Ok(Some(closed))
    }

    /// Probes both capture kinds once, honoring the runtime kill-switch.
    fn probe_permissions(&self) -> PermissionState {
        if !capture_enabled_from_env() {
            tracing::info!("capture disabled by kill-switch; probes skipped");
            return PermissionState::none();
        }

        PermissionState {
            screen_allowed: self.device.probe(CaptureKind::Screen),
            webcam_allowed: self.device.probe(CaptureKind::Webcam),
        }
    }

    async fn query_open_session(&self) -> Result<Option<Session>, TrackerError> {
        let records = self
            .store
            .query(
                SESSIONS_COLLECTION,
                Query::new()
                    .filter_eq("user_id", self.user_id.as_str())
                    .filter_null("end_time")
                    .order_desc("start_time")
                    .limit(1),
            )
            .await?;

        records
            .into_iter()
            .next()
            .map(Session::from_record)
            .transpose()
            .map_err(TrackerError::from)
    }

    fn cycle_deps(&self, session_id: &str) -> CycleDeps<S, B, C> {
        CycleDeps {
            store: Arc::clone(&self.store),
            blobs: Arc::clone(&self.blobs),
            device: Arc::clone(&self.device),
            shared: Arc::clone(&self.shared),
            user_id: self.user_id.clone(),
            session_id: session_id.to_string(),
            bucket: self.config.bucket.clone(),
            jpeg_quality: self.config.jpeg_quality,
        }
    }
}
