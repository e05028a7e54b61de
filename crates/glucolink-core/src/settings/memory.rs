// # Memory Settings Store
//
// In-memory implementation of SettingsStore.
//
// ## Purpose
//
// Provides a simple settings store that doesn't persist across restarts.
// Useful for testing and for hosts that keep their settings elsewhere and
// mirror them into glucolink.
//
// ## Crash Behavior
//
// - All settings, including the watermark, are lost on restart
// - The first sync after a restart re-sends the whole lookback window

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use crate::Error;
use crate::traits::settings_store::{SettingChange, SettingKey, SettingValue, SettingsStore};

/// Buffered change notifications per subscriber
pub(crate) const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// In-memory settings store implementation
///
/// # Example
///
/// ```rust,no_run
/// use glucolink_core::settings::MemorySettingsStore;
/// use glucolink_core::traits::{SettingKey, SettingValue, SettingsStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemorySettingsStore::new();
///
///     store.set(SettingKey::Enabled, Some(SettingValue::Flag(true))).await?;
///     assert!(store.snapshot().await?.enabled);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MemorySettingsStore {
    inner: Arc<RwLock<HashMap<SettingKey, SettingValue>>>,
    changes: broadcast::Sender<SettingChange>,
}

impl MemorySettingsStore {
    /// Create a new empty memory settings store
    pub fn new() -> Self {
        Self::from_values(std::iter::empty())
    }

    /// Create a store pre-populated with values, without notifying anyone
    pub fn from_values(values: impl IntoIterator<Item = (SettingKey, SettingValue)>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(RwLock::new(values.into_iter().collect())),
            changes,
        }
    }

    /// Number of settings that are set
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

impl Default for MemorySettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Turn a broadcast receiver into a change stream, skipping lag markers
pub(crate) fn change_stream(
    rx: broadcast::Receiver<SettingChange>,
) -> Pin<Box<dyn Stream<Item = SettingChange> + Send + 'static>> {
    let stream = BroadcastStream::new(rx).filter_map(|item| match item {
        Ok(change) => Some(change),
        Err(lagged) => {
            tracing::warn!("Settings watcher fell behind: {}", lagged);
            None
        }
    });
    Box::pin(stream)
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn get(&self, key: SettingKey) -> Result<Option<SettingValue>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.get(&key).cloned())
    }

    async fn set(&self, key: SettingKey, value: Option<SettingValue>) -> Result<(), Error> {
        if let Some(ref value) = value {
            key.check_value(value)?;
        }

        {
            let mut guard = self.inner.write().await;
            match value.clone() {
                Some(value) => guard.insert(key, value),
                None => guard.remove(&key),
            };
        }

        // No receivers is fine
        let _ = self.changes.send(SettingChange::new(key, value));
        Ok(())
    }

    fn watch(&self) -> Pin<Box<dyn Stream<Item = SettingChange> + Send + 'static>> {
        change_stream(self.changes.subscribe())
    }

    async fn flush(&self) -> Result<(), Error> {
        // Nothing to persist
        Ok(())
    }
}
