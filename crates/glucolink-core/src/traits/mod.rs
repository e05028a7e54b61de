//! Core traits for glucolink
//!
//! This module defines the abstract interfaces the engine is built on.
//!
//! - [`ReadingSource`]: Local store of recorded readings
//! - [`SettingsStore`]: User-editable settings and the upload watermark
//! - [`Collector`]: Transport to the remote collector
//! - [`AlertSink`]: Presentation of verification results

pub mod alert_sink;
pub mod collector;
pub mod reading_source;
pub mod settings_store;

pub use alert_sink::{AlertSink, LogAlertSink};
pub use collector::{Collector, CollectorRequest, CollectorResponse};
pub use reading_source::{RawSignal, Reading, ReadingSource, Trend};
pub use settings_store::{
    ConfigurationSnapshot, Credentials, SettingChange, SettingKey, SettingValue, SettingsStore,
};
