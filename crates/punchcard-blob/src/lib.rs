#![warn(missing_docs)]
//! # punchcard-blob
//!
//! ## Purpose
//! Defines the blob storage collaborator contract used for capture image
//! uploads and time-limited viewing URLs.
//!
//! ## Responsibilities
//! - Expose async upload and signed-URL creation over bucket/path addresses.
//! - Provide a deterministic in-memory store with injectable upload failure
//!   for tests and the demo binary.
//!
//! ## Data flow
//! The capture pipeline uploads encoded JPEG bytes at deterministic paths;
//! viewing components later exchange a path for a signed URL.
//!
//! ## Ownership and lifetimes
//! Uploaded byte buffers are moved into the store; fetches return copies.
//!
//! ## Error model
//! All operations surface [`BlobError`]. A failed upload stores nothing, so
//! metadata written only after successful uploads never dangles.
//!
//! ## Security and privacy notes
//! Image bytes are never logged. Signed URLs expire; the TTL must be
//! strictly positive.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use url::Url;

/// Blob storage contract.
pub trait BlobStore: Send + Sync + 'static {
    /// Stores `bytes` at `bucket`/`path`, replacing any existing object.
    fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
    ) -> impl Future<Output = Result<(), BlobError>> + Send;

    /// Creates a time-limited URL for reading the object at `bucket`/`path`.
    fn create_signed_url(
        &self,
        bucket: &str,
        path: &str,
        ttl_seconds: u64,
    ) -> impl Future<Output = Result<Url, BlobError>> + Send;
}

/// Base authority used by in-memory signed URLs.
const MEMORY_SIGNED_URL_BASE: &str = "https://blobs.punchcard.test";

/// Deterministic in-memory blob store for tests and the demo binary.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
    fail_uploads_containing: Mutex<Option<String>>,
    fail_all_uploads: AtomicBool,
}

impl MemoryBlobStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent upload fail until cleared.
    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_all_uploads.store(fail, Ordering::SeqCst);
    }

    /// Makes uploads whose path contains `marker` fail, leaving other paths
    /// untouched. Useful for failing one capture kind in a cycle.
    pub fn fail_uploads_containing(&self, marker: impl Into<String>) {
        *self.lock_marker() = Some(marker.into());
    }

    /// Returns a copy of the object at `bucket`/`path`, if present.
    pub fn object(&self, bucket: &str, path: &str) -> Option<Vec<u8>> {
        self.lock_objects()
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
    }

    /// Returns the number of stored objects.
    pub fn object_count(&self) -> usize {
        self.lock_objects().len()
    }

    fn lock_objects(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), Vec<u8>>> {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_marker(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.fail_uploads_containing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn validate_address(bucket: &str, path: &str) -> Result<(), BlobError> {
    if bucket.trim().is_empty() || path.trim().is_empty() {
        return Err(BlobError::InvalidAddress);
    }
    Ok(())
}

impl BlobStore for MemoryBlobStore {
    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>) -> Result<(), BlobError> {
        validate_address(bucket, path)?;

        if self.fail_all_uploads.load(Ordering::SeqCst) {
            return Err(BlobError::Upload(
                "injected blob upload failure".to_string(),
            ));
        }
        if let Some(marker) = self.lock_marker().as_deref()
            && path.contains(marker)
        {
            return Err(BlobError::Upload(format!(
                "injected blob upload failure for paths containing '{marker}'"
            )));
        }

        self.lock_objects()
            .insert((bucket.to_string(), path.to_string()), bytes);
        Ok(())
    }

    async fn create_signed_url(
        &self,
        bucket: &str,
        path: &str,
        ttl_seconds: u64,
    ) -> Result<Url, BlobError> {
        validate_address(bucket, path)?;
        if ttl_seconds == 0 {
            return Err(BlobError::InvalidTtl);
        }

        let exists = self
            .lock_objects()
            .contains_key(&(bucket.to_string(), path.to_string()));
        if !exists {
            return Err(BlobError::NotFound {
                bucket: bucket.to_string(),
                path: path.to_string(),
            });
        }

        let raw = format!("{MEMORY_SIGNED_URL_BASE}/{bucket}/{path}?expires_in={ttl_seconds}");
        Url::parse(&raw).map_err(|error| BlobError::Upload(error.to_string()))
    }
}

/// Blob storage error type.
#[derive(Debug, Error)]
pub enum BlobError {
    /// Bucket and path must be non-empty.
    #[error("bucket and path must be non-empty")]
    InvalidAddress,
    /// Signed URL lifetime must be strictly positive.
    #[error("signed url ttl must be greater than zero")]
    InvalidTtl,
    /// No object exists at the given address.
    #[error("no object at '{bucket}/{path}'")]
    NotFound {
        /// Bucket name.
        bucket: String,
        /// Object path.
        path: String,
    },
    /// Upload failure; the object was not stored.
    #[error("blob upload failure: {0}")]
    Upload(String),
}

#[cfg(test)]
mod tests {
    //! Unit tests for in-memory upload and signed URL behavior.

    use super::*;

    #[tokio::test]
    async fn uploads_then_fetches_bytes() {
        let blobs = MemoryBlobStore::new();
        blobs
            .upload("captures", "u/s/screen_t.jpg", vec![1, 2, 3])
            .await
            .expect("upload should succeed");
        assert_eq!(
            blobs.object("captures", "u/s/screen_t.jpg"),
            Some(vec![1, 2, 3])
        );
    }

    #[tokio::test]
    async fn signed_url_requires_existing_object_and_positive_ttl() {
        let blobs = MemoryBlobStore::new();
        blobs
            .upload("captures", "u/s/webcam_t.jpg", vec![0])
            .await
            .expect("upload should succeed");

        let url = blobs
            .create_signed_url("captures", "u/s/webcam_t.jpg", 600)
            .await
            .expect("signed url should build");
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.query(), Some("expires_in=600"));

        assert!(matches!(
            blobs.create_signed_url("captures", "u/s/webcam_t.jpg", 0).await,
            Err(BlobError::InvalidTtl)
        ));
        assert!(matches!(
            blobs.create_signed_url("captures", "missing.jpg", 600).await,
            Err(BlobError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn marker_failure_hits_matching_paths_only() {
        let blobs = MemoryBlobStore::new();
        blobs.fail_uploads_containing("screen_");

        let screen = blobs
            .upload("captures", "u/s/screen_t.jpg", vec![0])
            .await;
        assert!(matches!(screen, Err(BlobError::Upload(_))));

        blobs
            .upload("captures", "u/s/webcam_t.jpg", vec![0])
            .await
            .expect("webcam upload should succeed");
        assert_eq!(blobs.object_count(), 1);
    }
}
