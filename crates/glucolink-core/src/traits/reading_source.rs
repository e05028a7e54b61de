// # Reading Source Trait
//
// Defines the interface to the local store of recorded sensor readings.
//
// ## Implementations
//
// - In-memory: `source::MemoryReadingSource`
// - Newline-delimited JSON file: `source::NdjsonReadingSource`
//
// ## Usage
//
// ```rust,ignore
// use glucolink_core::ReadingSource;
//
// let pending = source.readings_since(watermark, 2016).await?;
// // pending[0] is the newest reading
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single recorded sensor reading
///
/// Readings are produced outside of glucolink; the core only reads and
/// serializes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// When the value was measured
    pub timestamp: DateTime<Utc>,

    /// Glucose value in mg/dL
    pub value: f64,

    /// Rate-of-change arrow, if the sensor computed one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend: Option<Trend>,

    /// Name of the device that recorded the value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,

    /// Raw sensor signal; kept locally, never uploaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<RawSignal>,
}

impl Reading {
    /// Create a reading with no trend, device or raw signal
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self {
            timestamp,
            value,
            trend: None,
            device: None,
            raw: None,
        }
    }

    /// Set the trend arrow
    pub fn with_trend(mut self, trend: Trend) -> Self {
        self.trend = Some(trend);
        self
    }

    /// Set the recording device
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    /// Attach the raw sensor signal
    pub fn with_raw(mut self, raw: RawSignal) -> Self {
        self.raw = Some(raw);
        self
    }
}

/// Raw-signal-only fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSignal {
    pub filtered: f64,
    pub unfiltered: f64,
    #[serde(default)]
    pub noise: Option<u8>,
    #[serde(default)]
    pub rssi: Option<i16>,
}

/// Trend arrow, named the way Nightscout names directions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    DoubleUp,
    SingleUp,
    FortyFiveUp,
    Flat,
    FortyFiveDown,
    SingleDown,
    DoubleDown,
    NotComputable,
    RateOutOfRange,
}

impl Trend {
    /// Wire name of the direction
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::DoubleUp => "DoubleUp",
            Trend::SingleUp => "SingleUp",
            Trend::FortyFiveUp => "FortyFiveUp",
            Trend::Flat => "Flat",
            Trend::FortyFiveDown => "FortyFiveDown",
            Trend::SingleDown => "SingleDown",
            Trend::DoubleDown => "DoubleDown",
            Trend::NotComputable => "NOT COMPUTABLE",
            Trend::RateOutOfRange => "RATE OUT OF RANGE",
        }
    }
}

/// Trait for reading source implementations
///
/// # Contract
///
/// - Only readings with `timestamp > after` are returned
/// - Results are ordered newest-first
/// - At most `limit` readings are returned (the newest ones)
///
/// # Forbidden Capabilities
/// - ❌ Network I/O (owned by `Collector`)
/// - ❌ Tracking what has been uploaded (owned by the watermark in `SettingsStore`)
#[async_trait]
pub trait ReadingSource: Send + Sync {
    /// Fetch readings strictly newer than `after`, newest-first
    async fn readings_since(
        &self,
        after: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Reading>, crate::Error>;

    /// Get the source name (for logging/debugging)
    fn source_name(&self) -> &'static str;
}
