// # Collector Trait
//
// Defines the transport to the remote collector.
//
// ## Implementations
//
// - Nightscout REST API: `glucolink-nightscout` crate
//
// ## Usage
//
// ```rust,ignore
// use glucolink_core::traits::{Collector, CollectorRequest};
//
// let request = CollectorRequest::new(&credentials);
// let response = collector.probe(&request).await?;
// if response.status == 200 { /* credentials accepted */ }
// ```

use async_trait::async_trait;

use crate::auth::ApiSecret;
use crate::traits::Credentials;

/// Addressing and authentication for one collector call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorRequest {
    /// Collector base URL
    pub endpoint: String,
    /// Derived `api-secret` header value
    pub api_secret: ApiSecret,
}

impl CollectorRequest {
    /// Build a request from plain credentials, hashing the API key
    pub fn new(credentials: &Credentials) -> Self {
        Self {
            endpoint: credentials.endpoint.clone(),
            api_secret: ApiSecret::derive(&credentials.api_key),
        }
    }
}

/// Status and body of a collector response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorResponse {
    pub status: u16,
    pub body: String,
}

impl CollectorResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// True for any 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Trimmed body, `None` when empty
    pub fn body_text(&self) -> Option<&str> {
        let body = self.body.trim();
        (!body.is_empty()).then_some(body)
    }
}

/// Trait for collector implementations
///
/// # Trust Level: Untrusted
///
/// Collectors are isolated, stateless and single-shot.
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/HTTPS calls to the configured endpoint only
/// - ✅ Report status and body as received
///
/// ## Forbidden Capabilities
/// - ❌ Retry or back off (an attempt is terminal)
/// - ❌ Interpret status codes (owned by `CredentialVerifier` and `Uploader`)
/// - ❌ Access the settings store or the watermark
/// - ❌ Spawn tasks
///
/// # Errors
///
/// - [`Error::Transport`](crate::Error::Transport) when no response arrived
/// - [`Error::InvalidResponse`](crate::Error::InvalidResponse) when a response
///   arrived but could not be read
#[async_trait]
pub trait Collector: Send + Sync {
    /// Send the authenticated probe to the verification sub-path
    async fn probe(&self, request: &CollectorRequest) -> Result<CollectorResponse, crate::Error>;

    /// POST an encoded entries document to the entries sub-path
    async fn post_entries(
        &self,
        request: &CollectorRequest,
        body: Vec<u8>,
    ) -> Result<CollectorResponse, crate::Error>;

    /// Get the collector name (for logging/debugging)
    fn collector_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_range() {
        assert!(CollectorResponse::new(200, "").is_success());
        assert!(CollectorResponse::new(204, "").is_success());
        assert!(!CollectorResponse::new(301, "").is_success());
        assert!(!CollectorResponse::new(401, "").is_success());
    }

    #[test]
    fn test_body_text() {
        assert_eq!(CollectorResponse::new(401, " bad key\n").body_text(), Some("bad key"));
        assert_eq!(CollectorResponse::new(500, "   ").body_text(), None);
    }

    #[test]
    fn test_request_hashes_key() {
        let request = CollectorRequest::new(&Credentials::new("https://ns.example.com", "password"));
        assert_eq!(
            request.api_secret.as_str(),
            "5baa61e4c9b93f3f0682250b6cf8331b7ee68fd8"
        );
    }
}
