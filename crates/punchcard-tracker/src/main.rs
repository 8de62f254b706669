#![warn(missing_docs)]
//! # punchcard-tracker binary
//!
//! Demo entry point: wires the in-memory collaborators and the synthetic
//! capture device, tracks a short session, and prints what was persisted.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use punchcard_blob::MemoryBlobStore;
use punchcard_capture::SyntheticCaptureDevice;
use punchcard_core::CAPTURES_COLLECTION;
use punchcard_store::MemoryStore;
use punchcard_tracker::{TimeTracker, TrackerConfig, TrackerError, app_version};
use tracing_subscriber::EnvFilter;

/// Demo entry point.
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    if let Err(error) = run().await {
        eprintln!("punchcard demo failed: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), TrackerError> {
    let store = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let device = Arc::new(SyntheticCaptureDevice::new());

    let config = TrackerConfig::from_env()?;
    let mut tracker = TimeTracker::new(
        "demo-user",
        config,
        Arc::clone(&store),
        Arc::clone(&blobs),
        device,
    )?;

    let session = tracker.start(Utc::now(), Some("demo session".to_string())).await?;
    println!("punchcard {} tracking session {}", app_version(), session.id);

    for _ in 0..3 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        if let Some(elapsed) = tracker.elapsed(Utc::now()) {
            println!("elapsed {elapsed}");
        }
    }

    if let Some(closed) = tracker.stop(Utc::now()).await? {
        let end = closed.end_time.map(|end| end.to_rfc3339()).unwrap_or_default();
        println!("session {} closed at {end}", closed.id);
    }

    println!(
        "capture records: {} | uploaded blobs: {}",
        store.record_count(CAPTURES_COLLECTION),
        blobs.object_count()
    );
    Ok(())
}
