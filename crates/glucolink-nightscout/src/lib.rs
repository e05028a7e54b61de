// # Nightscout Collector
//
// This crate provides the HTTP implementation of `Collector` for
// Nightscout-compatible servers.
//
// ## Behavior
//
// - ✅ One HTTP request per call
// - ✅ Status and body are returned as received; interpretation is owned by
//   `CredentialVerifier` and `Uploader`
// - ✅ HTTP timeout configured (default 30 seconds)
// - ❌ NO retry logic (an attempt is terminal)
// - ❌ NO background tasks
//
// ## Security Requirements
//
// - Only the hashed `api-secret` is sent; the plain API key never leaves the
//   core
// - The secret NEVER appears in logs
//
// ## API Reference
//
// - Verify: GET `{endpoint}/api/v1/experiments/test`
// - Upload: POST `{endpoint}/api/v1/entries` with a JSON array of entries

use async_trait::async_trait;
use glucolink_core::auth::{API_SECRET_HEADER, ENTRIES_PATH, VERIFY_PATH, collector_url};
use glucolink_core::config::CollectorConfig;
use glucolink_core::traits::{Collector, CollectorRequest, CollectorResponse};
use glucolink_core::{Error, Result};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::time::Duration;

const JSON_MEDIA_TYPE: &str = "application/json";

/// Nightscout collector over HTTPS
///
/// # Trust Level: Untrusted
///
/// Stateless and single-shot. Holds no credentials between calls.
#[derive(Clone)]
pub struct NightscoutCollector {
    /// HTTP client for API requests
    client: reqwest::Client,

    timeout: Duration,
}

impl NightscoutCollector {
    /// Create a collector with the configured timeout
    pub fn new(config: &CollectorConfig) -> Result<Self> {
        Self::with_timeout(config.http_timeout())
    }

    /// Create a collector with an explicit per-request timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("glucolink/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send a prepared request and read status and body
    async fn execute(&self, builder: reqwest::RequestBuilder) -> Result<CollectorResponse> {
        let response = builder.send().await.map_err(|e| transport_error(&e))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            Error::invalid_response(format!("Failed to read response body: {}", e))
        })?;

        tracing::debug!("Collector responded with status {}", status);
        Ok(CollectorResponse::new(status, body))
    }
}

/// Describe a failed send without echoing request headers
fn transport_error(e: &reqwest::Error) -> Error {
    let detail = if e.is_timeout() {
        "Request timed out".to_string()
    } else if e.is_connect() {
        format!("Connection failed: {}", e)
    } else if e.is_builder() {
        format!("Invalid collector URL: {}", e)
    } else {
        format!("HTTP request failed: {}", e)
    };
    Error::transport(detail)
}

#[async_trait]
impl Collector for NightscoutCollector {
    /// Authenticated probe
    ///
    /// ```http
    /// GET /api/v1/experiments/test
    /// api-secret: <sha1 hex>
    /// Content-Type: application/json
    /// Accept: application/json
    /// ```
    async fn probe(&self, request: &CollectorRequest) -> Result<CollectorResponse> {
        let url = collector_url(&request.endpoint, VERIFY_PATH);
        tracing::debug!("Probing {}", url);

        let builder = self
            .client
            .get(&url)
            .header(API_SECRET_HEADER, request.api_secret.as_str())
            .header(CONTENT_TYPE, JSON_MEDIA_TYPE)
            .header(ACCEPT, JSON_MEDIA_TYPE);

        self.execute(builder).await
    }

    /// Upload entries
    ///
    /// ```http
    /// POST /api/v1/entries
    /// api-secret: <sha1 hex>
    /// Content-Type: application/json
    /// Accept: application/json
    ///
    /// [{"type":"sgv","sgv":104,...}]
    /// ```
    async fn post_entries(
        &self,
        request: &CollectorRequest,
        body: Vec<u8>,
    ) -> Result<CollectorResponse> {
        let url = collector_url(&request.endpoint, ENTRIES_PATH);
        tracing::debug!("Posting {} byte(s) to {}", body.len(), url);

        let builder = self
            .client
            .post(&url)
            .header(API_SECRET_HEADER, request.api_secret.as_str())
            .header(CONTENT_TYPE, JSON_MEDIA_TYPE)
            .header(ACCEPT, JSON_MEDIA_TYPE)
            .body(body);

        self.execute(builder).await
    }

    fn collector_name(&self) -> &'static str {
        "nightscout"
    }
}

impl std::fmt::Debug for NightscoutCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NightscoutCollector")
            .field("timeout", &self.timeout)
            .finish()
    }
}
