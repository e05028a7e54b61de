// # Memory Reading Source
//
// In-memory implementation of ReadingSource, fed by the host application.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::newest_after;
use crate::Error;
use crate::traits::{Reading, ReadingSource};

/// In-memory reading source
///
/// Clones share the same readings, so a producer can keep a clone and push
/// while the engine reads.
#[derive(Debug, Clone, Default)]
pub struct MemoryReadingSource {
    readings: Arc<RwLock<Vec<Reading>>>,
}

impl MemoryReadingSource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source pre-populated with readings
    pub fn from_readings(readings: impl IntoIterator<Item = Reading>) -> Self {
        Self {
            readings: Arc::new(RwLock::new(readings.into_iter().collect())),
        }
    }

    /// Record a reading
    pub async fn push(&self, reading: Reading) {
        self.readings.write().await.push(reading);
    }

    /// Record several readings
    pub async fn extend(&self, readings: impl IntoIterator<Item = Reading>) {
        self.readings.write().await.extend(readings);
    }

    pub async fn len(&self) -> usize {
        self.readings.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.readings.read().await.is_empty()
    }
}

#[async_trait]
impl ReadingSource for MemoryReadingSource {
    async fn readings_since(
        &self,
        after: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Reading>, Error> {
        let guard = self.readings.read().await;
        Ok(newest_after(guard.iter().cloned(), after, limit))
    }

    fn source_name(&self) -> &'static str {
        "memory"
    }
}
