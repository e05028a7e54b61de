//! Contract Test: Credential Verification
//!
//! Constraints verified:
//! - Exactly one probe per verification, no retries
//! - Only HTTP 200 counts as success
//! - Rejections carry the collector's body text, or a status message
//! - Transport failures carry the transport detail
//! - Unreadable responses are failures that are not presented
//! - The probe carries the hashed key, never the plain key

mod common;

use common::*;
use glucolink_core::auth::ApiSecret;
use glucolink_core::verifier::{CredentialVerifier, FailureKind};
use std::sync::Arc;

fn verifier(collector: &Arc<ScriptedCollector>) -> CredentialVerifier {
    CredentialVerifier::new(collector.clone())
}

#[tokio::test]
async fn status_200_verifies() {
    let collector = Arc::new(ScriptedCollector::new().with_probe_reply(Reply::Status(200, "{}")));

    let result = verifier(&collector).verify(ENDPOINT, API_KEY).await;

    assert!(result.success);
    assert_eq!(result.failure_detail, None);
    assert_eq!(collector.probe_call_count(), 1);
    assert_eq!(collector.post_call_count(), 0, "verification never uploads");
}

#[tokio::test]
async fn rejection_carries_body_text() {
    let collector =
        Arc::new(ScriptedCollector::new().with_probe_reply(Reply::Status(401, "Unauthorized\n")));

    let result = verifier(&collector).verify(ENDPOINT, "wrong").await;

    assert!(!result.success);
    assert_eq!(result.failure_detail.as_deref(), Some("Unauthorized"));
    assert_eq!(result.failure_kind, Some(FailureKind::Status(401)));
    assert!(result.is_presentable());
    assert_eq!(collector.probe_call_count(), 1, "no retry after rejection");
}

#[tokio::test]
async fn empty_rejection_body_gets_status_message() {
    let collector = Arc::new(ScriptedCollector::new().with_probe_reply(Reply::Status(503, "  ")));

    let result = verifier(&collector).verify(ENDPOINT, API_KEY).await;

    assert!(!result.success);
    assert_eq!(
        result.failure_detail.as_deref(),
        Some("Collector responded with HTTP status 503")
    );
}

#[tokio::test]
async fn other_2xx_is_not_a_verification() {
    let collector = Arc::new(ScriptedCollector::new().with_probe_reply(Reply::Status(204, "")));

    let result = verifier(&collector).verify(ENDPOINT, API_KEY).await;

    assert!(!result.success);
    assert_eq!(result.failure_kind, Some(FailureKind::Status(204)));
}

#[tokio::test]
async fn transport_failure_carries_detail() {
    let collector = Arc::new(
        ScriptedCollector::new().with_probe_reply(Reply::Transport("operation timed out")),
    );

    let result = verifier(&collector).verify(ENDPOINT, API_KEY).await;

    assert!(!result.success);
    assert_eq!(result.failure_kind, Some(FailureKind::Transport));
    assert_eq!(result.failure_detail.as_deref(), Some("operation timed out"));
    assert!(result.is_presentable());
    assert_eq!(collector.probe_call_count(), 1, "no retry after timeout");
}

#[tokio::test]
async fn unreadable_response_is_not_presentable() {
    let collector = Arc::new(
        ScriptedCollector::new().with_probe_reply(Reply::Unreadable("body was not UTF-8")),
    );

    let result = verifier(&collector).verify(ENDPOINT, API_KEY).await;

    assert!(!result.success);
    assert_eq!(result.failure_kind, Some(FailureKind::InvalidResponse));
    assert!(!result.is_presentable());
}

#[tokio::test]
async fn probe_carries_hashed_key() {
    let collector = Arc::new(ScriptedCollector::new());

    verifier(&collector).verify(ENDPOINT, "password").await;

    let requests = collector.probe_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].endpoint, ENDPOINT);
    assert_eq!(requests[0].api_secret, ApiSecret::derive("password"));
    assert_eq!(
        requests[0].api_secret.as_str(),
        "5baa61e4c9b93f3f0682250b6cf8331b7ee68fd8"
    );
}
