//! Periodic capture scheduler and detached cycle execution.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use punchcard_blob::BlobStore;
use punchcard_capture::CaptureDevice;
use punchcard_core::{CAPTURES_COLLECTION, Capture};
use punchcard_store::RecordStore;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::lifecycle::{TrackerShared, lock_shared};
use crate::pipeline::{CycleRequest, capture_cycle};

/// Everything one spawned cycle needs, snapshot when the scheduler is armed.
pub(crate) struct CycleDeps<S, B, C> {
    pub store: Arc<S>,
    pub blobs: Arc<B>,
    pub device: Arc<C>,
    pub shared: Arc<Mutex<TrackerShared>>,
    pub user_id: String,
    pub session_id: String,
    pub bucket: String,
    pub jpeg_quality: u8,
}

// Derived Clone would demand Clone on S/B/C; only the Arcs are cloned.
impl<S, B, C> Clone for CycleDeps<S, B, C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            blobs: Arc::clone(&self.blobs),
            device: Arc::clone(&self.device),
            shared: Arc::clone(&self.shared),
            user_id: self.user_id.clone(),
            session_id: self.session_id.clone(),
            bucket: self.bucket.clone(),
            jpeg_quality: self.jpeg_quality,
        }
    }
}

/// Cancellable handle around the repeating capture timer.
///
/// The timer fires one full period after arming; the immediate session-start
/// cycle is run by the lifecycle manager itself. Disarming twice is a no-op,
/// and dropping the handle disarms it.
#[derive(Debug, Default)]
pub struct CaptureScheduler {
    handle: Option<JoinHandle<()>>,
}

impl CaptureScheduler {
    /// Creates a disarmed scheduler.
    pub(crate) fn new() -> Self {
        Self { handle: None }
    }

    /// Returns `true` while the repeating timer is running.
    pub fn is_armed(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Starts the repeating timer. Each tick spawns a detached cycle, so a
    /// slow upload never delays the next tick and overlapping cycles may
    /// complete out of order.
    pub(crate) fn arm<S, B, C>(&mut self, period: Duration, deps: CycleDeps<S, B, C>)
    where
        S: RecordStore,
        B: BlobStore,
        C: CaptureDevice,
    {
        self.disarm();

        let handle = tokio::spawn(async move {
            let first_tick = time::Instant::now() + period;
            let mut ticker = time::interval_at(first_tick, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                tokio::spawn(run_cycle(deps.clone(), Utc::now()));
            }
        });

        self.handle = Some(handle);
    }

    /// Cancels future ticks. In-flight cycles are left to finish; their
    /// metadata is suppressed by the open-session check in [`run_cycle`].
    pub fn disarm(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for CaptureScheduler {
    fn drop(&mut self) {
        self.disarm();
    }
}

/// Runs one full capture cycle against the shared tracker state.
///
/// Skips entirely when the session is no longer the open one. Permission
/// downgrades reported by the pipeline and the metadata batch write are both
/// applied only while this cycle's session is still open, so a cycle that
/// finishes after a stop or restart leaves the next session untouched.
/// Errors are logged, never propagated: a failing cycle must not kill the
/// timer.
pub(crate) async fn run_cycle<S, B, C>(deps: CycleDeps<S, B, C>, now: DateTime<Utc>)
where
    S: RecordStore,
    B: BlobStore,
    C: CaptureDevice,
{
    let permissions = {
        let shared = lock_shared(&deps.shared);
        match &shared.session {
            Some(session) if session.id == deps.session_id => shared.permissions,
            _ => return,
        }
    };
    if !permissions.any_granted() {
        return;
    }

    let outcome = capture_cycle(
        deps.blobs.as_ref(),
        deps.device.as_ref(),
        CycleRequest {
            user_id: &deps.user_id,
            session_id: &deps.session_id,
            bucket: &deps.bucket,
            jpeg_quality: deps.jpeg_quality,
            permissions,
            taken_at: now,
        },
    )
    .await;

    // Downgrades and metadata both belong to this cycle's session; a later
    // session re-derives its own permission state and must not inherit them.
    let still_open = {
        let mut shared = lock_shared(&deps.shared);
        let still_open = shared
            .session
            .as_ref()
            .map(|session| session.id == deps.session_id)
            .unwrap_or(false);
        if still_open {
            for kind in &outcome.downgraded {
                shared.permissions.downgrade(*kind);
            }
        }
        still_open
    };

    if outcome.uploaded.is_empty() {
        return;
    }
    if !still_open {
        tracing::info!(
            session_id = %deps.session_id,
            discarded = outcome.uploaded.len(),
            "session closed while cycle was in flight; capture metadata discarded"
        );
        return;
    }

    let records = outcome
        .uploaded
        .iter()
        .map(Capture::to_record)
        .collect::<Result<Vec<_>, _>>();
    match records {
        Ok(records) => {
            if let Err(error) = deps.store.insert_many(CAPTURES_COLLECTION, records).await {
                // Blobs are addressed by deterministic path and can be
                // reconciled later; the timer keeps running.
                tracing::warn!(
                    session_id = %deps.session_id,
                    error = %error,
                    "capture metadata batch insert failed"
                );
            } else {
                tracing::info!(
                    session_id = %deps.session_id,
                    recorded = outcome.uploaded.len(),
                    taken_at = %outcome.taken_at,
                    "capture cycle recorded"
                );
            }
        }
        Err(error) => {
            tracing::warn!(session_id = %deps.session_id, error = %error, "capture record encoding failed");
        }
    }
}
