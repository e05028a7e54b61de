//! Collector authentication and URL layout
//!
//! Nightscout-compatible collectors authenticate with an `api-secret` header
//! holding the lowercase hex SHA-1 digest of the API key.

use sha1::{Digest, Sha1};
use std::fmt;

/// Header carrying the derived secret
pub const API_SECRET_HEADER: &str = "api-secret";

/// Sub-path that accepts uploaded entries
pub const ENTRIES_PATH: &str = "api/v1/entries";

/// Sub-path of the authenticated probe
pub const VERIFY_PATH: &str = "api/v1/experiments/test";

/// Hashed API key, ready to be sent
///
/// The Debug implementation does not expose the digest.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiSecret(String);

impl ApiSecret {
    /// Derive the header value from a plain API key
    pub fn derive(api_key: &str) -> Self {
        let digest = Sha1::digest(api_key.as_bytes());
        Self(hex::encode(digest))
    }

    /// Header value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiSecret(<REDACTED>)")
    }
}

/// Join a collector endpoint and a sub-path
///
/// Trailing slashes on the endpoint are ignored, so `https://ns.example/`
/// and `https://ns.example` resolve identically.
pub fn collector_url(endpoint: &str, path: &str) -> String {
    format!(
        "{}/{}",
        endpoint.trim().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
