// # glucolink-core
//
// Core library for incremental upload of time-series readings to a
// Nightscout-compatible collector.
//
// ## Architecture Overview
//
// - **ReadingSource**: Trait for querying locally recorded readings
// - **SettingsStore**: Trait for observable key-value settings (and the watermark)
// - **Collector**: Trait for the remote collector's verify and ingest endpoints
// - **AlertSink**: Trait for presenting verification results to a user
// - **Uploader**: One watermark-checkpointed upload attempt
// - **CredentialVerifier**: Probe the collector with a candidate URL and key
// - **SyncEngine**: Debounced settings reactor that verifies, then syncs
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from transports and storage
// 2. **Event-Driven**: Settings changes arrive as async streams
// 3. **Checkpointed**: The watermark only advances after the collector acknowledges
// 4. **Library-First**: All core functionality can be used as a library

pub mod auth;
pub mod config;
pub mod debounce;
pub mod engine;
pub mod entry;
pub mod error;
pub mod settings;
pub mod source;
pub mod traits;
pub mod uploader;
pub mod verifier;

// Re-export core types for convenience
pub use traits::{AlertSink, Collector, ReadingSource, SettingsStore};
pub use engine::{SyncEngine, SyncEvent, SyncState};
pub use config::{CollectorConfig, EngineConfig, SyncConfig, UploadConfig};
pub use error::{Error, Result};
pub use settings::{FileSettingsStore, MemorySettingsStore};
pub use source::{MemoryReadingSource, NdjsonReadingSource};
pub use uploader::{UploadOutcome, Uploader};
pub use verifier::{CredentialVerifier, VerificationResult};
