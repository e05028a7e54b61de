// # File Settings Store
//
// File-based implementation of SettingsStore with crash recovery.
//
// ## Purpose
//
// Persists the user settings and the upload watermark across restarts, so
// an acknowledged window is never re-sent after a crash.
//
// ## Crash Recovery
//
// - Atomic writes: write-then-rename
// - Automatic backup: keeps `.backup` of the last known good file
// - Recovery: falls back to the backup if the main file is corrupted
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "settings": {
//     "enabled": true,
//     "url": "https://ns.example.com",
//     "apiKey": "...",
//     "primaryRole": true,
//     "watermarkTimestamp": "2026-01-09T12:00:00Z"
//   }
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{RwLock, broadcast};
use tokio_stream::Stream;

use super::memory::{CHANGE_CHANNEL_CAPACITY, change_stream};
use crate::Error;
use crate::traits::settings_store::{SettingChange, SettingKey, SettingValue, SettingsStore};

/// Settings file format version
const SETTINGS_FILE_VERSION: &str = "1.0";

/// Persisted settings
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    primary_role: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    watermark_timestamp: Option<DateTime<Utc>>,
}

impl StoredSettings {
    fn get(&self, key: SettingKey) -> Option<SettingValue> {
        match key {
            SettingKey::Enabled => self.enabled.map(SettingValue::Flag),
            SettingKey::Url => self.url.clone().map(SettingValue::Text),
            SettingKey::ApiKey => self.api_key.clone().map(SettingValue::Text),
            SettingKey::PrimaryRole => self.primary_role.map(SettingValue::Flag),
            SettingKey::WatermarkTimestamp => {
                self.watermark_timestamp.map(SettingValue::Timestamp)
            }
        }
    }

    // Value types are checked by the caller
    fn set(&mut self, key: SettingKey, value: Option<&SettingValue>) {
        match key {
            SettingKey::Enabled => self.enabled = value.and_then(SettingValue::as_flag),
            SettingKey::PrimaryRole => self.primary_role = value.and_then(SettingValue::as_flag),
            SettingKey::Url => self.url = value.and_then(text_of),
            SettingKey::ApiKey => self.api_key = value.and_then(text_of),
            SettingKey::WatermarkTimestamp => {
                self.watermark_timestamp = value.and_then(SettingValue::as_timestamp)
            }
        }
    }

    fn len(&self) -> usize {
        SettingKey::ALL
            .iter()
            .filter(|key| self.get(**key).is_some())
            .count()
    }
}

fn text_of(value: &SettingValue) -> Option<String> {
    match value {
        SettingValue::Text(text) => Some(text.clone()),
        _ => None,
    }
}

// Custom Debug implementation that hides the API key
impl std::fmt::Debug for StoredSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredSettings")
            .field("enabled", &self.enabled)
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<REDACTED>"))
            .field("primary_role", &self.primary_role)
            .field("watermark_timestamp", &self.watermark_timestamp)
            .finish()
    }
}

/// Serializable settings file format
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SettingsFileFormat {
    version: String,
    settings: StoredSettings,
}

/// Why a settings file could not be loaded
enum LoadFailure {
    /// The file exists but is not a valid settings document
    Corrupt(String),
    /// The file could not be read at all
    Unreadable(Error),
}

/// File-based settings store with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use glucolink_core::settings::FileSettingsStore;
/// use glucolink_core::traits::SettingsStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileSettingsStore::new("/var/lib/glucolink/settings.json").await?;
///
///     // Written to disk before returning
///     store.set_watermark("2026-01-09T12:00:00Z".parse()?).await?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileSettingsStore {
    path: PathBuf,
    state: Arc<RwLock<StoredSettings>>,
    changes: broadcast::Sender<SettingChange>,
}

impl FileSettingsStore {
    /// Create or load a file settings store
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Load the existing settings file
    /// 3. If it is corrupted, load the backup instead
    /// 4. If both are unusable, start with empty settings
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create settings directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let settings = Self::load_with_recovery(&path).await?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(settings)),
            changes,
        })
    }

    /// Path of the settings file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings, falling back to the backup on corruption
    async fn load_with_recovery(path: &Path) -> Result<StoredSettings, Error> {
        let failure = match Self::load(path).await {
            Ok(settings) => {
                tracing::debug!("Loaded {} setting(s) from {}", settings.len(), path.display());
                return Ok(settings);
            }
            Err(LoadFailure::Unreadable(e)) => return Err(e),
            Err(LoadFailure::Corrupt(reason)) => reason,
        };

        tracing::warn!(
            "Settings file appears corrupted: {}. Attempting recovery from backup.",
            failure
        );

        let backup_path = Self::backup_path(path);
        if !backup_path.exists() {
            tracing::warn!("No backup file found. Starting with empty settings.");
            return Ok(StoredSettings::default());
        }

        match Self::load(&backup_path).await {
            Ok(settings) => {
                tracing::info!("Recovered {} setting(s) from backup", settings.len());
                if let Err(e) = fs::copy(&backup_path, path).await {
                    tracing::error!("Failed to restore settings file from backup: {}", e);
                }
                Ok(settings)
            }
            Err(LoadFailure::Corrupt(reason)) => {
                tracing::error!(
                    "Backup also corrupted: {}. Starting with empty settings.",
                    reason
                );
                Ok(StoredSettings::default())
            }
            Err(LoadFailure::Unreadable(e)) => Err(e),
        }
    }

    /// Load settings from one file
    async fn load(path: &Path) -> Result<StoredSettings, LoadFailure> {
        if !path.exists() {
            tracing::debug!("Settings file does not exist: {}", path.display());
            return Ok(StoredSettings::default());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            LoadFailure::Unreadable(Error::settings_store(format!(
                "Failed to read settings file {}: {}",
                path.display(),
                e
            )))
        })?;

        let file: SettingsFileFormat = serde_json::from_str(&content)
            .map_err(|e| LoadFailure::Corrupt(format!("{}: {}", path.display(), e)))?;

        if file.version != SETTINGS_FILE_VERSION {
            tracing::warn!(
                "Settings file version mismatch: expected {}, got {}. Attempting to load anyway.",
                SETTINGS_FILE_VERSION,
                file.version
            );
        }

        Ok(file.settings)
    }

    /// Write settings to file atomically
    async fn write(&self, settings: &StoredSettings) -> Result<(), Error> {
        let file = SettingsFileFormat {
            version: SETTINGS_FILE_VERSION.to_string(),
            settings: settings.clone(),
        };

        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| Error::settings_store(format!("Failed to serialize settings: {}", e)))?;

        let temp_path = self.temp_path();
        {
            let mut temp = fs::File::create(&temp_path).await.map_err(|e| {
                Error::settings_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            temp.write_all(json.as_bytes()).await.map_err(|e| {
                Error::settings_store(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            temp.sync_all().await.map_err(|e| {
                Error::settings_store(format!(
                    "Failed to sync temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create settings backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::settings_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Settings written to {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl SettingsStore for FileSettingsStore {
    async fn get(&self, key: SettingKey) -> Result<Option<SettingValue>, Error> {
        let guard = self.state.read().await;
        Ok(guard.get(key))
    }

    async fn set(&self, key: SettingKey, value: Option<SettingValue>) -> Result<(), Error> {
        if let Some(ref value) = value {
            key.check_value(value)?;
        }

        {
            // Held across the write so concurrent sets land on disk in order
            let mut guard = self.state.write().await;
            let mut updated = guard.clone();
            updated.set(key, value.as_ref());
            self.write(&updated).await?;
            *guard = updated;
        }

        let _ = self.changes.send(SettingChange::new(key, value));
        Ok(())
    }

    fn watch(&self) -> Pin<Box<dyn Stream<Item = SettingChange> + Send + 'static>> {
        change_stream(self.changes.subscribe())
    }

    async fn flush(&self) -> Result<(), Error> {
        // Every set is already on disk
        Ok(())
    }
}
