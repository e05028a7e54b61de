//! Credential verifier
//!
//! Sends one authenticated probe to the collector and turns the outcome
//! into a [`VerificationResult`]. Exactly one result per call, no retries.
//!
//! | Outcome | Result |
//! |---|---|
//! | transport error | failure, transport detail |
//! | response that cannot be read | failure, not surfaced to the user |
//! | status != 200 | failure, body text or a status message |
//! | status == 200 | success |

use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::Error;
use crate::traits::{Collector, CollectorRequest, Credentials};

/// Why a verification failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// No response arrived
    Transport,
    /// The collector answered with this non-200 status
    Status(u16),
    /// A response arrived but could not be interpreted
    InvalidResponse,
}

/// Outcome of one credential verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    pub success: bool,
    pub failure_detail: Option<String>,
    pub failure_kind: Option<FailureKind>,
}

impl VerificationResult {
    /// Successful verification
    pub fn verified() -> Self {
        Self {
            success: true,
            failure_detail: None,
            failure_kind: None,
        }
    }

    /// Failed verification
    pub fn failed(kind: FailureKind, detail: Option<String>) -> Self {
        Self {
            success: false,
            failure_detail: detail,
            failure_kind: Some(kind),
        }
    }

    /// Whether a failure of this kind is shown to the user
    ///
    /// Unreadable responses are logged only.
    pub fn is_presentable(&self) -> bool {
        self.failure_kind != Some(FailureKind::InvalidResponse)
    }
}

/// Verifies collector credentials with a single probe
#[derive(Clone)]
pub struct CredentialVerifier {
    collector: Arc<dyn Collector>,
}

impl CredentialVerifier {
    /// Create a verifier over a collector
    pub fn new(collector: Arc<dyn Collector>) -> Self {
        Self { collector }
    }

    /// Probe `endpoint` with the secret derived from `api_key`
    pub async fn verify(&self, endpoint: &str, api_key: &str) -> VerificationResult {
        self.verify_credentials(&Credentials::new(endpoint, api_key))
            .await
    }

    /// Probe the collector with the given credentials
    pub async fn verify_credentials(&self, credentials: &Credentials) -> VerificationResult {
        let request = CollectorRequest::new(credentials);
        debug!(
            "Verifying credentials against {} ({})",
            request.endpoint,
            self.collector.collector_name()
        );

        match self.collector.probe(&request).await {
            Ok(response) if response.status == 200 => {
                debug!("Collector accepted credentials");
                VerificationResult::verified()
            }
            Ok(response) => {
                let detail = response
                    .body_text()
                    .map(str::to_string)
                    .unwrap_or_else(|| {
                        format!("Collector responded with HTTP status {}", response.status)
                    });
                warn!(
                    "Collector rejected credentials (status {}): {}",
                    response.status, detail
                );
                VerificationResult::failed(FailureKind::Status(response.status), Some(detail))
            }
            Err(Error::Transport(detail)) => {
                warn!("Verification request failed: {}", detail);
                VerificationResult::failed(FailureKind::Transport, Some(detail))
            }
            Err(Error::InvalidResponse(detail)) => {
                warn!("Verification response could not be read: {}", detail);
                VerificationResult::failed(FailureKind::InvalidResponse, Some(detail))
            }
            Err(e) => {
                warn!("Verification failed: {}", e);
                VerificationResult::failed(FailureKind::Transport, Some(e.to_string()))
            }
        }
    }
}

impl std::fmt::Debug for CredentialVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVerifier")
            .field("collector", &self.collector.collector_name())
            .finish()
    }
}
