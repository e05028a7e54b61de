//! Error types for glucolink
//!
//! Every failure of a single verification or upload attempt is expressed
//! here. Attempts are terminal: the engine logs or surfaces them, it never
//! retries.

use thiserror::Error;

/// Result type alias for glucolink operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for glucolink
#[derive(Error, Debug)]
pub enum Error {
    /// Network or connection failure (DNS, refused, timeout, TLS)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The collector answered with a status the caller does not accept
    #[error("HTTP status {status}: {body}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
        /// Response body text (may be empty)
        body: String,
    },

    /// The outgoing document could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A response arrived but could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Synchronization is not configured (disabled, follower role or
    /// missing credentials). Callers skip silently.
    #[error("Not configured: {0}")]
    NotConfigured(String),

    /// Settings store failures
    #[error("Settings store error: {0}")]
    SettingsStore(String),

    /// Reading source failures
    #[error("Reading source error: {0}")]
    ReadingSource(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON errors outside of entry encoding
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create an HTTP status error
    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            body: body.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create an invalid response error
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Create a "not configured" error
    pub fn not_configured(msg: impl Into<String>) -> Self {
        Self::NotConfigured(msg.into())
    }

    /// Create a settings store error
    pub fn settings_store(msg: impl Into<String>) -> Self {
        Self::SettingsStore(msg.into())
    }

    /// Create a reading source error
    pub fn reading_source(msg: impl Into<String>) -> Self {
        Self::ReadingSource(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True for the silent "not configured" case
    pub fn is_not_configured(&self) -> bool {
        matches!(self, Self::NotConfigured(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
