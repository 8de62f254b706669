//! Capture pipeline: one cycle of acquire, encode, upload.
//!
//! A cycle touches no tracker state of its own. It receives a permission
//! snapshot and reports uploads and downgrades back as an explicit
//! [`CycleOutcome`]; the scheduler layer applies downgrades and performs the
//! guarded metadata batch write.

use chrono::{DateTime, Utc};
use punchcard_blob::BlobStore;
use punchcard_capture::CaptureDevice;
use punchcard_core::{Capture, CaptureKind, Frame, PermissionState, capture_storage_path};
use uuid::Uuid;

use crate::TrackerError;

/// Inputs for one capture cycle.
#[derive(Debug, Clone, Copy)]
pub struct CycleRequest<'a> {
    /// Owning user identifier.
    pub user_id: &'a str,
    /// Open session identifier.
    pub session_id: &'a str,
    /// Blob bucket receiving images.
    pub bucket: &'a str,
    /// JPEG encode quality (1-100).
    pub jpeg_quality: u8,
    /// Permission snapshot taken when the cycle was scheduled.
    pub permissions: PermissionState,
    /// Shared timestamp for every capture in this cycle.
    pub taken_at: DateTime<Utc>,
}

/// What one cycle produced.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    /// Shared timestamp of the cycle.
    pub taken_at: DateTime<Utc>,
    /// Captures whose blob upload succeeded, in pipeline order.
    pub uploaded: Vec<Capture>,
    /// Kinds that failed and must stay denied for the rest of the session.
    pub downgraded: Vec<CaptureKind>,
}

impl CycleOutcome {
    /// Returns `true` when the cycle neither uploaded nor downgraded.
    pub fn is_empty(&self) -> bool {
        self.uploaded.is_empty() && self.downgraded.is_empty()
    }
}

/// Runs the acquire/encode/upload steps of one capture cycle.
///
/// Each granted kind is attempted independently: a failure downgrades that
/// kind only and never aborts the other. Both kinds share `taken_at`, so
/// same-cycle captures stay correlated by timestamp and path.
pub async fn capture_cycle<B, C>(blobs: &B, device: &C, request: CycleRequest<'_>) -> CycleOutcome
where
    B: BlobStore,
    C: CaptureDevice,
{
    let mut uploaded = Vec::new();
    let mut downgraded = Vec::new();

    for kind in CaptureKind::ALL {
        if !request.permissions.allows(kind) {
            continue;
        }

        match capture_one(blobs, device, &request, kind).await {
            Ok(capture) => uploaded.push(capture),
            Err(error) => {
                tracing::warn!(
                    kind = %kind,
                    session_id = %request.session_id,
                    error = %error,
                    "capture failed; kind disabled for the rest of the session"
                );
                downgraded.push(kind);
            }
        }
    }

    CycleOutcome {
        taken_at: request.taken_at,
        uploaded,
        downgraded,
    }
}

async fn capture_one<B, C>(
    blobs: &B,
    device: &C,
    request: &CycleRequest<'_>,
    kind: CaptureKind,
) -> Result<Capture, TrackerError>
where
    B: BlobStore,
    C: CaptureDevice,
{
    let frame = device.acquire_frame(kind, request.taken_at)?;
    let jpeg = encode_jpeg(&frame, request.jpeg_quality)?;
    let storage_path =
        capture_storage_path(request.user_id, request.session_id, kind, request.taken_at)?;

    blobs.upload(request.bucket, &storage_path, jpeg).await?;

    Ok(Capture {
        id: Uuid::new_v4().to_string(),
        session_id: request.session_id.to_string(),
        storage_path,
        taken_at: request.taken_at,
        kind,
    })
}

/// Encodes one RGBA frame as JPEG.
///
/// # Errors
/// Returns [`TrackerError::Encode`] when the encoder rejects the buffer.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, TrackerError> {
    let rgb = rgba_to_rgb(&frame.rgba);

    let mut jpeg = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, quality)
        .encode(
            &rgb,
            frame.width,
            frame.height,
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|error| TrackerError::Encode(error.to_string()))?;

    Ok(jpeg)
}

// JPEG carries no alpha channel; frames arrive validated as RGBA.
fn rgba_to_rgb(rgba: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity((rgba.len() / 4) * 3);
    for pixel in rgba.chunks_exact(4) {
        rgb.extend_from_slice(&pixel[..3]);
    }
    rgb
}

#[cfg(test)]
mod tests {
    //! Unit tests for JPEG encoding.

    use super::*;

    #[test]
    fn encodes_validated_frame() {
        let frame = Frame::new(2, 2, vec![128; 16]).expect("frame fixture should be valid");
        let jpeg = encode_jpeg(&frame, 80).expect("encode should succeed");
        // JPEG SOI marker.
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn drops_alpha_channel() {
        let rgba = vec![1, 2, 3, 255, 4, 5, 6, 255];
        assert_eq!(rgba_to_rgb(&rgba), vec![1, 2, 3, 4, 5, 6]);
    }
}
