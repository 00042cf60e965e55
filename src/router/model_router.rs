//! Dispatch of classified messages to a model
//!
//! Domain-specific messages go to the fine-tuned endpoint in one call; the
//! reply text is recorded in history and returned as JSON. Everything else
//! opens a streaming call to the general-purpose endpoint with the system
//! prompt and the user's recent history, and every streamed fragment is
//! recorded as its own model turn before it is handed to the caller.

use crate::error::{AppError, AppResult};
use crate::history::ConversationHistory;
use crate::metrics::Metrics;
use crate::models::{
    GenerateContentRequest, GenerationConfig, GenerativeClient, ModelFragmentStream, Turn,
};
use crate::router::Intent;
use crate::router::prompts::tuned_prompt;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use serde_json::Value;
use std::sync::Arc;
use tracing::Instrument;

/// Text fragments of a streamed reply, already recorded in history
pub type ReplyStream = BoxStream<'static, String>;

/// Result of routing one message
pub enum RouteOutcome {
    /// Complete JSON reply from the fine-tuned model
    Reply(Value),
    /// Incremental reply from the general-purpose model
    Stream(ReplyStream),
}

impl std::fmt::Debug for RouteOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reply(value) => f.debug_tuple("Reply").field(value).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Endpoints used by [`ModelRouter`]
#[derive(Debug, Clone)]
pub struct ModelEndpoints {
    /// Streaming endpoint of the general-purpose model
    pub stream_url: String,
    /// Single-shot endpoint of the fine-tuned model
    pub tuned_url: String,
}

/// Routes classified messages to the fine-tuned or general-purpose model
pub struct ModelRouter {
    client: GenerativeClient,
    history: ConversationHistory,
    endpoints: ModelEndpoints,
    generation_config: GenerationConfig,
    system_prompt: String,
    metrics: Arc<Metrics>,
}

impl ModelRouter {
    pub fn new(
        client: GenerativeClient,
        history: ConversationHistory,
        endpoints: ModelEndpoints,
        generation_config: GenerationConfig,
        system_prompt: impl Into<String>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            client,
            history,
            endpoints,
            generation_config,
            system_prompt: system_prompt.into(),
            metrics,
        }
    }

    /// Answer `message` from `user_id` according to `intent`
    ///
    /// The user's own turn must already be in history.
    pub async fn route(
        &self,
        intent: Intent,
        message: &str,
        user_id: &str,
    ) -> AppResult<RouteOutcome> {
        match intent {
            Intent::NotGeneral => self.tuned_reply(message, user_id).await.map(RouteOutcome::Reply),
            Intent::General => self
                .general_stream(message, user_id)
                .await
                .map(RouteOutcome::Stream),
        }
    }

    async fn tuned_reply(&self, message: &str, user_id: &str) -> AppResult<Value> {
        let url = &self.endpoints.tuned_url;
        let request = GenerateContentRequest {
            contents: vec![Turn::user(tuned_prompt(&self.system_prompt, message))],
            generation_config: Some(self.generation_config),
        };

        let response = self.client.generate(url, &request).await?;
        if response.candidates.is_empty() {
            return Err(AppError::NoCandidates {
                endpoint: url.clone(),
            });
        }

        let text = response
            .first_text()
            .ok_or_else(|| AppError::MalformedResponse {
                endpoint: url.clone(),
                reason: "first candidate carries no text".to_string(),
            })?
            .to_string();

        self.history.append(user_id, &Turn::model(text.as_str())).await?;

        Ok(parse_reply(&text))
    }

    async fn general_stream(&self, message: &str, user_id: &str) -> AppResult<ReplyStream> {
        let stored = self.history.recent(user_id).await?;
        let request = GenerateContentRequest {
            contents: conversation(&self.system_prompt, stored, message),
            generation_config: None,
        };

        tracing::debug!(
            endpoint = %self.endpoints.stream_url,
            turns = request.contents.len(),
            "Opening streaming reply"
        );
        let fragments = self
            .client
            .stream_generate(&self.endpoints.stream_url, &request)
            .await?;

        Ok(record_fragments(
            fragments,
            self.history.clone(),
            self.metrics.clone(),
            user_id.to_string(),
            tracing::Span::current(),
        ))
    }
}

/// Interpret fine-tuned model text as JSON, wrapping plain text as `{reply}`
pub fn parse_reply(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| serde_json::json!({ "reply": text }))
}

/// Contents of a streaming request: system prompt, stored history oldest
/// first, then the new message
///
/// `stored` is newest first. Its head is dropped when it is the user turn for
/// `message`, which the caller records before routing.
fn conversation(system_prompt: &str, mut stored: Vec<Turn>, message: &str) -> Vec<Turn> {
    let current = Turn::user(message);
    if stored.first() == Some(&current) {
        stored.remove(0);
    }
    stored.reverse();

    let mut contents = Vec::with_capacity(stored.len() + 2);
    contents.push(Turn::user(system_prompt.trim()));
    contents.extend(stored);
    contents.push(current);
    contents
}

/// Record every fragment as a model turn, then pass it on
///
/// The stream is polled after the handler returns, so each step runs inside
/// `span` to keep the request's log context. A read error ends the reply
/// early; history write failures are logged and the fragment is still
/// delivered.
fn record_fragments(
    fragments: ModelFragmentStream,
    history: ConversationHistory,
    metrics: Arc<Metrics>,
    user_id: String,
    span: tracing::Span,
) -> ReplyStream {
    stream::unfold(
        (fragments, history, metrics, user_id, span),
        |(mut fragments, history, metrics, user_id, span)| {
            let step_span = span.clone();
            async move {
                match fragments.next().await {
                    Some(Ok(fragment)) => {
                        if let Err(e) =
                            history.append(&user_id, &Turn::model(fragment.as_str())).await
                        {
                            tracing::warn!(
                                client_id = %user_id,
                                error = %e,
                                "Failed to record streamed fragment"
                            );
                        }
                        metrics.stream_fragment();
                        Some((fragment, (fragments, history, metrics, user_id, span)))
                    }
                    Some(Err(e)) => {
                        tracing::error!(
                            client_id = %user_id,
                            error = %e,
                            "Streaming reply interrupted"
                        );
                        metrics.mid_stream_failure();
                        None
                    }
                    None => {
                        tracing::debug!(
                            client_id = %user_id,
                            bytes_received = fragments.bytes_received(),
                            "Streaming reply finished"
                        );
                        None
                    }
                }
            }
            .instrument(step_span)
        },
    )
    .boxed()
}
