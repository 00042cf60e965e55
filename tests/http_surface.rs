//! Integration tests for the non-chat endpoints and shared middleware

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use chatrelay::{
    config::Config,
    handlers::{AppState, app},
    middleware::REQUEST_ID_HEADER,
};
use std::str::FromStr;
use tower::ServiceExt;

fn test_app() -> axum::Router {
    let config = Config::from_str(
        r#"
[server]
host = "127.0.0.1"
port = 5000

[models.general]
url = "http://127.0.0.1:1/general:generateContent"

[models.tuned]
url = "http://127.0.0.1:1/tuned:generateContent"

[credentials]
source = "static"
token = "t"
"#,
    )
    .unwrap();
    app(AppState::new(config).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_health_returns_ok() {
    let response = test_app().oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, r#"{"status":"OK"}"#);
}

#[tokio::test]
async fn test_index_serves_chat_page() {
    let response = test_app().oneshot(get("/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/html")
    );
    assert!(body_text(response).await.contains("/chat"));
}

#[tokio::test]
async fn test_metrics_exposes_empty_message_counter() {
    let app = test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/chat")
        .body(Body::from("{}"))
        .unwrap();
    app.clone().oneshot(request).await.unwrap();

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response)
        .await
        .contains("chatrelay_empty_messages_total 1"));
}

#[tokio::test]
async fn test_every_response_carries_request_id() {
    let response = test_app().oneshot(get("/health")).await.unwrap();
    let id = response.headers().get(REQUEST_ID_HEADER).unwrap();
    assert!(uuid::Uuid::parse_str(id.to_str().unwrap()).is_ok());
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let response = test_app().oneshot(get("/v1/chat/completions")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
