// # NDJSON Reading Source
//
// Reads readings from a newline-delimited JSON file, one `Reading` per line:
//
// ```text
// {"timestamp":"2026-01-09T12:00:00Z","value":104.0,"trend":"Flat"}
// {"timestamp":"2026-01-09T12:05:00Z","value":108.0,"trend":"FortyFiveUp"}
// ```
//
// The file is re-read on every call, so an external recorder can append to
// it while glucolink runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;

use super::newest_after;
use crate::Error;
use crate::traits::{Reading, ReadingSource};

/// NDJSON file reading source
#[derive(Debug, Clone)]
pub struct NdjsonReadingSource {
    path: PathBuf,
}

impl NdjsonReadingSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse(&self, content: &str) -> Vec<Reading> {
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(index, line)| match serde_json::from_str::<Reading>(line) {
                Ok(reading) => Some(reading),
                Err(e) => {
                    tracing::warn!(
                        "Skipping malformed reading at {}:{}: {}",
                        self.path.display(),
                        index + 1,
                        e
                    );
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl ReadingSource for NdjsonReadingSource {
    async fn readings_since(
        &self,
        after: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Reading>, Error> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Readings file does not exist yet: {}", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(Error::reading_source(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        Ok(newest_after(self.parse(&content), after, limit))
    }

    fn source_name(&self) -> &'static str {
        "ndjson"
    }
}
