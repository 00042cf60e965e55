//! Integration tests for service-account token exchange
//!
//! A wiremock server stands in for the OAuth2 token endpoint and the model API.

use chatrelay::{
    error::AppError,
    metrics::Metrics,
    models::{
        CredentialError, GenerateContentRequest, GenerativeClient, ServiceAccountKey,
        ServiceAccountTokenProvider, TokenProvider,
    },
};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY_PATH: &str = concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/tests/fixtures/service_account.json"
);

fn provider(server: &MockServer, metrics: Arc<Metrics>) -> ServiceAccountTokenProvider {
    let key = ServiceAccountKey::from_file(KEY_PATH).expect("fixture key should load");
    ServiceAccountTokenProvider::new(
        key,
        vec!["https://www.googleapis.com/auth/cloud-platform".to_string()],
        Some(format!("{}/token", server.uri())),
        reqwest::Client::new(),
        metrics,
    )
}

fn token_response(token: &str, expires_in: u64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": token,
        "expires_in": expires_in,
        "token_type": "Bearer"
    }))
}

#[test]
fn test_fixture_key_loads() {
    let key = ServiceAccountKey::from_file(KEY_PATH).unwrap();
    assert_eq!(
        key.client_email(),
        "relay@chatrelay-test.iam.gserviceaccount.com"
    );
    assert_eq!(key.token_uri(), "https://oauth2.googleapis.com/token");
}

#[test]
fn test_missing_key_file_is_reported() {
    let err = ServiceAccountKey::from_file("/nonexistent/key.json").unwrap_err();
    assert!(matches!(err, CredentialError::ReadKeyFile { .. }));
}

#[tokio::test]
async fn test_token_is_exchanged_once_and_cached() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains(
            "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer",
        ))
        .and(body_string_contains("assertion=ey"))
        .respond_with(token_response("ya29.cached", 3600))
        .expect(1)
        .mount(&server)
        .await;

    let metrics = Arc::new(Metrics::new().unwrap());
    let provider = provider(&server, metrics.clone());

    assert_eq!(provider.access_token().await.unwrap(), "ya29.cached");
    assert_eq!(provider.access_token().await.unwrap(), "ya29.cached");
    assert_eq!(metrics.token_refreshes_count(), 1);
}

#[tokio::test]
async fn test_token_near_expiry_is_refreshed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(token_response("ya29.short", 30))
        .expect(2)
        .mount(&server)
        .await;

    let metrics = Arc::new(Metrics::new().unwrap());
    let provider = provider(&server, metrics.clone());

    provider.access_token().await.unwrap();
    provider.access_token().await.unwrap();
    assert_eq!(metrics.token_refreshes_count(), 2);
}

#[tokio::test]
async fn test_rejected_exchange_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid_grant"))
        .mount(&server)
        .await;

    let provider = provider(&server, Arc::new(Metrics::new().unwrap()));
    let err = provider.access_token().await.unwrap_err();

    match err {
        CredentialError::Rejected { status, body, .. } => {
            assert_eq!(status, 401);
            assert_eq!(body, "invalid_grant");
        }
        other => panic!("expected Rejected, got {:?}", other),
    }
}

#[tokio::test]
async fn test_model_calls_carry_exchanged_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(token_response("ya29.model", 3600))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/model:generateContent"))
        .and(header("authorization", "Bearer ya29.model"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": "general"}]}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = Arc::new(provider(&server, Arc::new(Metrics::new().unwrap())));
    let client = GenerativeClient::new(reqwest::Client::new(), provider);

    let response = client
        .generate(
            &format!("{}/model:generateContent", server.uri()),
            &GenerateContentRequest::single_turn("hi"),
        )
        .await
        .unwrap();
    assert_eq!(response.first_text(), Some("general"));
}

#[tokio::test]
async fn test_token_failure_surfaces_as_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/model:generateContent"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let provider = Arc::new(provider(&server, Arc::new(Metrics::new().unwrap())));
    let client = GenerativeClient::new(reqwest::Client::new(), provider);

    let err = client
        .generate(
            &format!("{}/model:generateContent", server.uri()),
            &GenerateContentRequest::single_turn("hi"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Credentials(_)));
    assert!(err.is_transport());
}
