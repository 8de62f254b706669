//! Tracker configuration and runtime kill-switch.

use std::time::Duration;

use crate::TrackerError;

/// Default capture cycle period in seconds.
pub const DEFAULT_CAPTURE_INTERVAL_SECS: u64 = 300;

/// Default blob bucket receiving capture images.
pub const DEFAULT_CAPTURE_BUCKET: &str = "captures";

/// Default JPEG encode quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Env var overriding the capture cycle period, in whole seconds.
pub const CAPTURE_INTERVAL_ENV: &str = "PUNCHCARD_CAPTURE_INTERVAL_SECS";

/// Env var overriding the capture bucket name.
pub const CAPTURE_BUCKET_ENV: &str = "PUNCHCARD_CAPTURE_BUCKET";

/// Runtime kill-switch env var; see [`capture_enabled_from_env`].
pub const CAPTURE_ENABLED_ENV: &str = "PUNCHCARD_CAPTURE_ENABLED";

/// Validated tracker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Period between scheduled capture cycles.
    pub capture_interval: Duration,
    /// Blob bucket receiving capture images.
    pub bucket: String,
    /// JPEG encode quality (1-100).
    pub jpeg_quality: u8,
}

impl TrackerConfig {
    /// Creates a validated configuration.
    ///
    /// # Errors
    /// Returns [`TrackerError::InvalidConfig`] when `interval_secs` is zero
    /// or `bucket` is blank.
    pub fn new(interval_secs: u64, bucket: impl Into<String>) -> Result<Self, TrackerError> {
        if interval_secs == 0 {
            return Err(TrackerError::InvalidConfig(
                "capture interval must be greater than zero seconds".to_string(),
            ));
        }

        let bucket = bucket.into();
        if bucket.trim().is_empty() {
            return Err(TrackerError::InvalidConfig(
                "capture bucket must be non-empty".to_string(),
            ));
        }

        Ok(Self {
            capture_interval: Duration::from_secs(interval_secs),
            bucket,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        })
    }

    /// Overrides the JPEG encode quality.
    ///
    /// # Errors
    /// Returns [`TrackerError::InvalidConfig`] when `quality` is outside
    /// 1-100.
    pub fn with_jpeg_quality(mut self, quality: u8) -> Result<Self, TrackerError> {
        if !(1..=100).contains(&quality) {
            return Err(TrackerError::InvalidConfig(
                "jpeg quality must be within 1-100".to_string(),
            ));
        }
        self.jpeg_quality = quality;
        Ok(self)
    }

    /// Builds configuration from env vars, falling back to defaults.
    ///
    /// # Errors
    /// Returns [`TrackerError::InvalidConfig`] when an override is present
    /// but unparseable or out of range.
    pub fn from_env() -> Result<Self, TrackerError> {
        let interval_secs = match std::env::var(CAPTURE_INTERVAL_ENV) {
            Ok(raw) => raw.trim().parse::<u64>().map_err(|error| {
                TrackerError::InvalidConfig(format!(
                    "{CAPTURE_INTERVAL_ENV} must be a whole number of seconds: {error}"
                ))
            })?,
            Err(_) => DEFAULT_CAPTURE_INTERVAL_SECS,
        };

        let bucket = std::env::var(CAPTURE_BUCKET_ENV)
            .unwrap_or_else(|_| DEFAULT_CAPTURE_BUCKET.to_string());

        Self::new(interval_secs, bucket)
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            capture_interval: Duration::from_secs(DEFAULT_CAPTURE_INTERVAL_SECS),
            bucket: DEFAULT_CAPTURE_BUCKET.to_string(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Checks the runtime capture kill-switch.
///
/// Semantics:
/// - Unset => capture enabled.
/// - `0`, `false`, `off` (case-insensitive) => capture disabled.
/// - Any other value => capture enabled.
///
/// Disabling capture never disables time tracking itself; the lifecycle
/// manager treats it as both permissions denied at session start.
pub fn capture_enabled_from_env() -> bool {
    match std::env::var(CAPTURE_ENABLED_ENV) {
        Ok(value) => {
            let normalized = value.trim().to_ascii_lowercase();
            !(normalized == "0" || normalized == "false" || normalized == "off")
        }
        Err(_) => true,
    }
}
