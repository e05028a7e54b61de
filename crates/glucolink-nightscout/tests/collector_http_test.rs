//! HTTP-level tests for the Nightscout collector against a mock server

use glucolink_core::auth::ApiSecret;
use glucolink_core::traits::{Collector, CollectorRequest, Credentials};
use glucolink_core::verifier::{CredentialVerifier, FailureKind};
use glucolink_core::Error;
use glucolink_nightscout::NightscoutCollector;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PASSWORD_SHA1: &str = "5baa61e4c9b93f3f0682250b6cf8331b7ee68fd8";

fn collector() -> NightscoutCollector {
    NightscoutCollector::with_timeout(Duration::from_secs(5)).unwrap()
}

fn request(server: &MockServer) -> CollectorRequest {
    CollectorRequest::new(&Credentials::new(server.uri(), "password"))
}

#[tokio::test]
async fn test_probe_sends_hashed_secret() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/experiments/test"))
        .and(header("api-secret", PASSWORD_SHA1))
        .and(header("content-type", "application/json"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let response = collector().probe(&request(&mock_server)).await.unwrap();

    assert_eq!(response.status, 200);
    assert!(response.body.contains("ok"));
}

#[tokio::test]
async fn test_trailing_slash_endpoint_resolves_same_path() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/experiments/test"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = CollectorRequest {
        endpoint: format!("{}/", mock_server.uri()),
        api_secret: ApiSecret::derive("password"),
    };
    let response = collector().probe(&request).await.unwrap();

    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn test_rejection_body_is_returned() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/experiments/test"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&mock_server)
        .await;

    let response = collector().probe(&request(&mock_server)).await.unwrap();

    assert_eq!(response.status, 401);
    assert_eq!(response.body_text(), Some("Unauthorized"));
}

#[tokio::test]
async fn test_post_entries_sends_json_array() {
    let mock_server = MockServer::start().await;
    let document = serde_json::json!([{"type": "sgv", "sgv": 104, "date": 1767960000000i64}]);
    Mock::given(method("POST"))
        .and(path("/api/v1/entries"))
        .and(header("api-secret", PASSWORD_SHA1))
        .and(header("content-type", "application/json"))
        .and(body_json(&document))
        .respond_with(ResponseTemplate::new(200).set_body_json(&document))
        .expect(1)
        .mount(&mock_server)
        .await;

    let body = serde_json::to_vec(&document).unwrap();
    let response = collector()
        .post_entries(&request(&mock_server), body)
        .await
        .unwrap();

    assert!(response.is_success());
}

#[tokio::test]
async fn test_empty_success_body() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/entries"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    let response = collector()
        .post_entries(&request(&mock_server), b"[]".to_vec())
        .await
        .unwrap();

    assert_eq!(response.status, 204);
    assert!(response.is_success());
    assert_eq!(response.body_text(), None);
}

#[tokio::test]
async fn test_timeout_is_transport_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/experiments/test"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&mock_server)
        .await;

    let collector = NightscoutCollector::with_timeout(Duration::from_millis(200)).unwrap();
    let result = collector.probe(&request(&mock_server)).await;

    match result {
        Err(Error::Transport(detail)) => assert_eq!(detail, "Request timed out"),
        other => panic!("expected transport error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_collector_is_transport_error() {
    let mock_server = MockServer::start().await;
    let uri = mock_server.uri();
    drop(mock_server);

    let request = CollectorRequest::new(&Credentials::new(uri, "password"));
    let result = collector().probe(&request).await;

    assert!(matches!(result, Err(Error::Transport(_))));
}

#[tokio::test]
async fn test_verifier_over_http() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/experiments/test"))
        .and(header("api-secret", PASSWORD_SHA1))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/experiments/test"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&mock_server)
        .await;

    let verifier = CredentialVerifier::new(Arc::new(collector()));

    let accepted = verifier.verify(&mock_server.uri(), "password").await;
    assert!(accepted.success);

    let rejected = verifier.verify(&mock_server.uri(), "wrong").await;
    assert!(!rejected.success);
    assert_eq!(rejected.failure_kind, Some(FailureKind::Status(401)));
    assert_eq!(rejected.failure_detail.as_deref(), Some("Unauthorized"));
}
