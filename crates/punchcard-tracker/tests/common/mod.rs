//! Shared fixtures for tracker integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use punchcard_blob::MemoryBlobStore;
use punchcard_capture::SyntheticCaptureDevice;
use punchcard_core::SESSIONS_COLLECTION;
use punchcard_store::{MemoryStore, RecordStore};
use punchcard_tracker::{TimeTracker, TrackerConfig};

/// In-memory collaborators wired the way the demo binary wires them.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub device: Arc<SyntheticCaptureDevice>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            blobs: Arc::new(MemoryBlobStore::new()),
            device: Arc::new(SyntheticCaptureDevice::new()),
        }
    }

    /// Builds an idle tracker for `user_id` over this harness's collaborators.
    pub fn tracker(
        &self,
        user_id: &str,
    ) -> TimeTracker<MemoryStore, MemoryBlobStore, SyntheticCaptureDevice> {
        TimeTracker::new(
            user_id,
            TrackerConfig::default(),
            Arc::clone(&self.store),
            Arc::clone(&self.blobs),
            Arc::clone(&self.device),
        )
        .expect("harness tracker config should be valid")
    }

    /// Seeds an open session record, as a tracker on another device would.
    pub async fn seed_open_session(&self, id: &str, user_id: &str, start_time: &str) {
        self.store
            .insert(
                SESSIONS_COLLECTION,
                serde_json::json!({
                    "id": id,
                    "user_id": user_id,
                    "start_time": start_time,
                    "end_time": null,
                    "description": null,
                }),
            )
            .await
            .expect("seeding an open session should succeed");
    }
}
