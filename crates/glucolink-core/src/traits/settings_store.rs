// # Settings Store Trait
//
// Defines the interface to the persisted, user-editable settings.
//
// ## Purpose
//
// The settings store holds the five recognized keys:
// - `enabled`: whether uploads are switched on
// - `url`: collector endpoint
// - `apiKey`: collector API key (plain; hashed before it leaves the process)
// - `primaryRole`: whether this process is the authoritative uploader
// - `watermarkTimestamp`: newest reading confirmed by the collector
//
// Every `set` is broadcast on the `watch()` stream, which is what the
// `SyncEngine` reacts to.
//
// ## Implementations
//
// - In-memory: `settings::MemorySettingsStore`
// - JSON file with crash recovery: `settings::FileSettingsStore`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use tokio_stream::Stream;

/// Recognized setting keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettingKey {
    #[serde(rename = "enabled")]
    Enabled,
    #[serde(rename = "url")]
    Url,
    #[serde(rename = "apiKey")]
    ApiKey,
    #[serde(rename = "watermarkTimestamp")]
    WatermarkTimestamp,
    #[serde(rename = "primaryRole")]
    PrimaryRole,
}

impl SettingKey {
    /// All recognized keys
    pub const ALL: [SettingKey; 5] = [
        SettingKey::Enabled,
        SettingKey::Url,
        SettingKey::ApiKey,
        SettingKey::WatermarkTimestamp,
        SettingKey::PrimaryRole,
    ];

    /// Wire name of the key
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::Enabled => "enabled",
            SettingKey::Url => "url",
            SettingKey::ApiKey => "apiKey",
            SettingKey::WatermarkTimestamp => "watermarkTimestamp",
            SettingKey::PrimaryRole => "primaryRole",
        }
    }

    /// Check that `value` has the type this key stores
    pub fn check_value(&self, value: &SettingValue) -> Result<(), crate::Error> {
        let matches = match self {
            SettingKey::Enabled | SettingKey::PrimaryRole => {
                matches!(value, SettingValue::Flag(_))
            }
            SettingKey::Url | SettingKey::ApiKey => matches!(value, SettingValue::Text(_)),
            SettingKey::WatermarkTimestamp => matches!(value, SettingValue::Timestamp(_)),
        };

        if matches {
            Ok(())
        } else {
            Err(crate::Error::settings_store(format!(
                "Setting {} does not accept {:?}",
                self, value
            )))
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SettingKey {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SettingKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| crate::Error::config(format!("Unknown setting key: {}", s)))
    }
}

/// A setting value
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Flag(bool),
    Timestamp(DateTime<Utc>),
    Text(String),
}

impl SettingValue {
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            SettingValue::Flag(value) => Some(*value),
            _ => None,
        }
    }

    /// Non-empty text value
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SettingValue::Text(value) if !value.trim().is_empty() => Some(value.trim()),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            SettingValue::Timestamp(value) => Some(*value),
            _ => None,
        }
    }
}

// Text values may hold the API key
impl fmt::Debug for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Flag(value) => write!(f, "Flag({})", value),
            SettingValue::Timestamp(value) => write!(f, "Timestamp({})", value.to_rfc3339()),
            SettingValue::Text(_) => f.write_str("Text(<REDACTED>)"),
        }
    }
}

/// Notification that a setting was written
///
/// `value` is `None` when the setting was cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingChange {
    pub key: SettingKey,
    pub value: Option<SettingValue>,
}

impl SettingChange {
    /// Create a new setting change event
    pub fn new(key: SettingKey, value: Option<SettingValue>) -> Self {
        Self { key, value }
    }
}

/// Point-in-time view of the settings that gate synchronization
#[derive(Clone, PartialEq, Eq)]
pub struct ConfigurationSnapshot {
    pub enabled: bool,
    pub endpoint_url: Option<String>,
    pub api_key: Option<String>,
    pub is_primary_role: bool,
}

impl ConfigurationSnapshot {
    /// Extract credentials when synchronization may run
    ///
    /// Any combination other than enabled + primary role + URL + key is
    /// reported as [`Error::NotConfigured`](crate::Error::NotConfigured).
    pub fn credentials(&self) -> Result<Credentials, crate::Error> {
        if !self.enabled {
            return Err(crate::Error::not_configured("synchronization is disabled"));
        }
        if !self.is_primary_role {
            return Err(crate::Error::not_configured("not the primary role"));
        }
        let endpoint = self
            .endpoint_url
            .as_deref()
            .ok_or_else(|| crate::Error::not_configured("endpoint URL is missing"))?;
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| crate::Error::not_configured("API key is missing"))?;

        Ok(Credentials::new(endpoint, api_key))
    }

    /// True when enabled, primary role and both credentials are present
    pub fn is_ready(&self) -> bool {
        self.credentials().is_ok()
    }
}

impl fmt::Debug for ConfigurationSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurationSnapshot")
            .field("enabled", &self.enabled)
            .field("endpoint_url", &self.endpoint_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<REDACTED>"))
            .field("is_primary_role", &self.is_primary_role)
            .finish()
    }
}

/// Endpoint and API key of the collector
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub endpoint: String,
    pub api_key: String,
}

impl Credentials {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<REDACTED>")
            .finish()
    }
}

/// Trait for settings store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks.
///
/// # Watermark Discipline
///
/// `watermarkTimestamp` has a single writer: the `Uploader`. Hosts must not
/// write it while an engine is running.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Read a setting
    ///
    /// # Returns
    ///
    /// - `Ok(Some(value))`: The stored value
    /// - `Ok(None)`: The setting is not set
    /// - `Err(Error)`: Storage error
    async fn get(&self, key: SettingKey) -> Result<Option<SettingValue>, crate::Error>;

    /// Write (or clear, with `None`) a setting and notify watchers
    async fn set(&self, key: SettingKey, value: Option<SettingValue>)
    -> Result<(), crate::Error>;

    /// Stream of every subsequent `set`
    ///
    /// Each call returns an independent subscription. Dropping the stream
    /// unsubscribes.
    fn watch(&self) -> Pin<Box<dyn Stream<Item = SettingChange> + Send + 'static>>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;

    /// Build a [`ConfigurationSnapshot`] from the current values
    ///
    /// Unset flags default to disabled / primary role.
    async fn snapshot(&self) -> Result<ConfigurationSnapshot, crate::Error> {
        let enabled = self.get(SettingKey::Enabled).await?;
        let url = self.get(SettingKey::Url).await?;
        let api_key = self.get(SettingKey::ApiKey).await?;
        let primary = self.get(SettingKey::PrimaryRole).await?;

        Ok(ConfigurationSnapshot {
            enabled: enabled.and_then(|v| v.as_flag()).unwrap_or(false),
            endpoint_url: url.as_ref().and_then(|v| v.as_text()).map(str::to_string),
            api_key: api_key.as_ref().and_then(|v| v.as_text()).map(str::to_string),
            is_primary_role: primary.and_then(|v| v.as_flag()).unwrap_or(true),
        })
    }

    /// Timestamp of the newest reading the collector acknowledged
    async fn watermark(&self) -> Result<Option<DateTime<Utc>>, crate::Error> {
        Ok(self
            .get(SettingKey::WatermarkTimestamp)
            .await?
            .and_then(|v| v.as_timestamp()))
    }

    /// Advance the watermark
    async fn set_watermark(&self, timestamp: DateTime<Utc>) -> Result<(), crate::Error> {
        self.set(
            SettingKey::WatermarkTimestamp,
            Some(SettingValue::Timestamp(timestamp)),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_snapshot() -> ConfigurationSnapshot {
        ConfigurationSnapshot {
            enabled: true,
            endpoint_url: Some("https://ns.example.com".to_string()),
            api_key: Some("secret".to_string()),
            is_primary_role: true,
        }
    }

    #[test]
    fn test_ready_snapshot_yields_credentials() {
        let creds = ready_snapshot().credentials().unwrap();
        assert_eq!(creds.endpoint, "https://ns.example.com");
        assert_eq!(creds.api_key, "secret");
    }

    #[test]
    fn test_incomplete_snapshots_are_not_configured() {
        let mut disabled = ready_snapshot();
        disabled.enabled = false;

        let mut follower = ready_snapshot();
        follower.is_primary_role = false;

        let mut no_url = ready_snapshot();
        no_url.endpoint_url = None;

        let mut no_key = ready_snapshot();
        no_key.api_key = None;

        for snapshot in [disabled, follower, no_url, no_key] {
            let err = snapshot.credentials().unwrap_err();
            assert!(err.is_not_configured(), "unexpected error: {}", err);
            assert!(!snapshot.is_ready());
        }
    }

    #[test]
    fn test_secrets_not_exposed_in_debug() {
        let snapshot = ready_snapshot();
        let debug_str = format!("{:?} {:?}", snapshot, snapshot.credentials().unwrap());
        assert!(!debug_str.contains("secret"));

        let value = SettingValue::Text("secret".to_string());
        assert!(!format!("{:?}", value).contains("secret"));
    }

    #[test]
    fn test_blank_text_is_absent() {
        assert_eq!(SettingValue::Text("  ".to_string()).as_text(), None);
        assert_eq!(
            SettingValue::Text(" https://a.example ".to_string()).as_text(),
            Some("https://a.example")
        );
    }

    #[test]
    fn test_setting_key_round_trip() {
        for key in SettingKey::ALL {
            assert_eq!(key.as_str().parse::<SettingKey>().unwrap(), key);
        }
        assert!("nope".parse::<SettingKey>().is_err());
    }

    #[test]
    fn test_check_value_types() {
        assert!(SettingKey::Enabled.check_value(&SettingValue::Flag(true)).is_ok());
        assert!(SettingKey::Url.check_value(&SettingValue::Flag(true)).is_err());
        assert!(
            SettingKey::ApiKey
                .check_value(&SettingValue::Text("k".to_string()))
                .is_ok()
        );
        assert!(
            SettingKey::WatermarkTimestamp
                .check_value(&SettingValue::Text("k".to_string()))
                .is_err()
        );
    }

    #[test]
    fn test_setting_value_untagged_json() {
        let flag: SettingValue = serde_json::from_str("true").unwrap();
        assert_eq!(flag, SettingValue::Flag(true));

        let ts: SettingValue = serde_json::from_str("\"2026-01-09T12:00:00Z\"").unwrap();
        assert!(ts.as_timestamp().is_some());

        let text: SettingValue = serde_json::from_str("\"https://ns.example.com\"").unwrap();
        assert_eq!(text.as_text(), Some("https://ns.example.com"));
    }
}
