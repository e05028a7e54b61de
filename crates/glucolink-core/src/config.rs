//! Configuration types for glucolink
//!
//! These are the static knobs of the library. The user-editable settings
//! (endpoint, API key, enabled flag, role, watermark) live in a
//! [`SettingsStore`](crate::traits::SettingsStore) instead.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main glucolink configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Orchestrator settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Uploader settings
    #[serde(default)]
    pub upload: UploadConfig,

    /// Collector transport settings
    #[serde(default)]
    pub collector: CollectorConfig,
}

impl SyncConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.engine.validate()?;
        self.upload.validate()?;
        self.collector.validate()?;
        Ok(())
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Minimum interval between two accepted change events for the same
    /// setting key (in milliseconds)
    ///
    /// Settings editors tend to fire several notifications for one edit;
    /// everything inside this window after an accepted event is ignored.
    #[serde(default = "default_debounce_window_ms")]
    pub debounce_window_ms: u64,

    /// Interval of the ambient periodic sync (in seconds)
    ///
    /// Set to 0 to disable; `synchronize()` is then only called by the host.
    #[serde(default)]
    pub sync_interval_secs: u64,

    /// Capacity of the monitoring event channel
    ///
    /// When full, new events are dropped with a warning log.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Debounce window as a [`Duration`]
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }

    /// Periodic sync interval, `None` when disabled
    pub fn sync_interval(&self) -> Option<Duration> {
        (self.sync_interval_secs > 0).then(|| Duration::from_secs(self.sync_interval_secs))
    }

    fn validate(&self) -> Result<(), crate::Error> {
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_window_ms: default_debounce_window_ms(),
            sync_interval_secs: 0,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

/// Uploader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Maximum number of readings sent in one upload
    #[serde(default = "default_max_readings")]
    pub max_readings: usize,

    /// Oldest reading age considered for upload (in hours)
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: u64,
}

impl UploadConfig {
    /// Lookback window as a chrono duration
    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::hours(self.lookback_hours as i64)
    }

    fn validate(&self) -> Result<(), crate::Error> {
        if self.max_readings == 0 {
            return Err(crate::Error::config("Upload max_readings must be > 0"));
        }
        if self.lookback_hours == 0 {
            return Err(crate::Error::config("Upload lookback_hours must be > 0"));
        }
        if self.lookback_hours > i32::MAX as u64 {
            return Err(crate::Error::config("Upload lookback_hours is too large"));
        }
        Ok(())
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_readings: default_max_readings(),
            lookback_hours: default_lookback_hours(),
        }
    }
}

/// Collector transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// HTTP timeout per request (in seconds)
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

impl CollectorConfig {
    /// Timeout as a [`Duration`]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    fn validate(&self) -> Result<(), crate::Error> {
        if self.http_timeout_secs == 0 {
            return Err(crate::Error::config("Collector http_timeout_secs must be > 0"));
        }
        Ok(())
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

fn default_debounce_window_ms() -> u64 {
    200
}

fn default_event_channel_capacity() -> usize {
    1000
}

// One week of five-minute readings
fn default_max_readings() -> usize {
    7 * 24 * 12
}

fn default_lookback_hours() -> u64 {
    7 * 24
}

fn default_http_timeout_secs() -> u64 {
    30
}
