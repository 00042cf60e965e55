//! Chat endpoint handler
//!
//! Classifies the message, records the user's turn and answers either with a
//! JSON reply from the fine-tuned model or with a server-sent event stream of
//! `{"response": fragment}` objects from the general-purpose model.

use crate::error::{AppResult, replies};
use crate::handlers::AppState;
use crate::middleware::ClientId;
use crate::models::Turn;
use crate::router::RouteOutcome;
use axum::{
    Json,
    body::Bytes,
    extract::State,
    response::{
        IntoResponse, Response,
        sse::{Event, Sse},
    },
};
use futures::StreamExt;
use serde::Deserialize;
use std::convert::Infallible;

/// Chat request body
///
/// A body that is not valid JSON, or whose `message` is not a string, is
/// treated as having no message.
#[derive(Debug, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
}

impl ChatRequest {
    /// Parse a request body leniently
    pub fn from_body(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }

    /// The message, if present and non-empty
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref().filter(|m| !m.is_empty())
    }
}

/// Chat endpoint handler
pub async fn handler(State(state): State<AppState>, client: ClientId, body: Bytes) -> Response {
    let request = ChatRequest::from_body(&body);
    let Some(message) = request.message() else {
        tracing::info!(client_id = %client, "Rejected chat request without a message");
        state.metrics().record_empty_message();
        return Json(serde_json::json!({ "reply": replies::EMPTY_MESSAGE })).into_response();
    };

    match respond(&state, &client, message).await {
        Ok(response) => response,
        Err(e) => {
            state.metrics().record_failure(e.kind());
            e.into_response()
        }
    }
}

async fn respond(state: &AppState, client: &ClientId, message: &str) -> AppResult<Response> {
    let intent = state.classifier().classify(message).await?;
    state.metrics().record_request(intent);
    tracing::info!(
        client_id = %client,
        intent = intent.as_str(),
        message_chars = message.chars().count(),
        "Chat request classified"
    );

    state
        .history()
        .append(client.as_str(), &Turn::user(message))
        .await?;

    match state.router().route(intent, message, client.as_str()).await? {
        RouteOutcome::Reply(reply) => Ok(Json(reply).into_response()),
        RouteOutcome::Stream(fragments) => {
            let events = fragments.map(|fragment| {
                Ok::<_, Infallible>(
                    Event::default().data(serde_json::json!({ "response": fragment }).to_string()),
                )
            });
            Ok(Sse::new(events).into_response())
        }
    }
}
