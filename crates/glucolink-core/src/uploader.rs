//! Uploader
//!
//! Sends readings newer than the watermark to the collector and advances the
//! watermark once the collector has acknowledged them.
//!
//! ## Flow
//!
//! 1. Read the watermark; the lower bound is `max(watermark, now - lookback)`
//! 2. Fetch up to `max_readings` readings newer than the bound
//! 3. Nothing pending → done, no network call
//! 4. Encode the batch; unencodable readings are skipped, and a batch with
//!    nothing encodable aborts before any network call
//! 5. POST once; transport error or non-2xx → error, watermark untouched
//! 6. 2xx (any body) → watermark = newest timestamp of the fetched batch,
//!    skipped readings included, so they are not fetched again
//!
//! Readings recorded after step 2 are left for the next call.
//!
//! ## Single Flight
//!
//! Calls are serialized by an async mutex. A second caller waits, then
//! re-reads the advanced watermark, so an acknowledged window is never sent
//! twice by overlapping calls.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::UploadConfig;
use crate::entry::encode_entries;
use crate::error::{Error, Result};
use crate::traits::{Collector, CollectorRequest, Credentials, ReadingSource, SettingsStore};

/// Result of a sync or upload call that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Synchronization is not configured; nothing was attempted
    NotConfigured,
    /// No readings newer than the watermark
    NothingPending,
    /// The collector acknowledged `count` readings
    Uploaded {
        count: usize,
        watermark: DateTime<Utc>,
    },
}

/// Uploads pending readings and owns the watermark
pub struct Uploader {
    readings: Arc<dyn ReadingSource>,
    settings: Arc<dyn SettingsStore>,
    collector: Arc<dyn Collector>,
    max_readings: usize,
    lookback: chrono::Duration,
    in_flight: Mutex<()>,
}

impl Uploader {
    /// Create an uploader
    pub fn new(
        readings: Arc<dyn ReadingSource>,
        settings: Arc<dyn SettingsStore>,
        collector: Arc<dyn Collector>,
        config: &UploadConfig,
    ) -> Self {
        Self {
            readings,
            settings,
            collector,
            max_readings: config.max_readings,
            lookback: config.lookback(),
            in_flight: Mutex::new(()),
        }
    }

    /// Upload everything newer than the watermark, once
    ///
    /// # Errors
    ///
    /// - `Transport` / `InvalidResponse`: from the collector
    /// - `HttpStatus`: the collector answered outside 200..=299
    /// - `Serialization`: no pending reading could be encoded
    /// - `ReadingSource` / `SettingsStore`: local storage failures
    ///
    /// The watermark is unchanged on every error path.
    pub async fn upload(&self, credentials: &Credentials) -> Result<UploadOutcome> {
        let _in_flight = self.in_flight.lock().await;

        let watermark = self.settings.watermark().await?;
        let floor = Utc::now() - self.lookback;
        let after = watermark.map_or(floor, |w| w.max(floor));

        let mut pending = self
            .readings
            .readings_since(after, self.max_readings)
            .await?;
        pending.retain(|reading| reading.timestamp > after);

        let Some(newest) = pending.iter().map(|reading| reading.timestamp).max() else {
            debug!("No readings newer than {}, nothing to upload", after.to_rfc3339());
            return Ok(UploadOutcome::NothingPending);
        };
        let batch = encode_entries(&pending)?;
        let count = batch.encoded;
        if batch.skipped > 0 {
            warn!(
                "Left {} unencodable reading(s) out of the upload",
                batch.skipped
            );
        }

        let request = CollectorRequest::new(credentials);

        info!(
            "Uploading {} reading(s) to {} via {} (newest: {})",
            count,
            request.endpoint,
            self.collector.collector_name(),
            newest.to_rfc3339()
        );

        let response = self.collector.post_entries(&request, batch.body).await?;
        if !response.is_success() {
            warn!(
                "Collector rejected upload of {} reading(s): status {}",
                count, response.status
            );
            return Err(Error::http_status(response.status, response.body));
        }

        debug_assert!(watermark.is_none_or(|current| newest > current));
        self.settings.set_watermark(newest).await?;
        info!(
            "Upload acknowledged, watermark advanced to {}",
            newest.to_rfc3339()
        );

        Ok(UploadOutcome::Uploaded {
            count,
            watermark: newest,
        })
    }
}

impl std::fmt::Debug for Uploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Uploader")
            .field("readings", &self.readings.source_name())
            .field("collector", &self.collector.collector_name())
            .field("max_readings", &self.max_readings)
            .field("lookback", &self.lookback)
            .finish()
    }
}
