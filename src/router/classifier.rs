//! Intent classification through the general-purpose model
//!
//! The classifier embeds the user's message in a fixed instruction prompt, sends
//! it as a single-turn request and maps the first candidate's text onto
//! [`Intent`]. When the model returns no candidates the message is treated as
//! general so the user still gets an answer. A candidate without text is a
//! malformed response.

use crate::error::{AppError, AppResult};
use crate::metrics::Metrics;
use crate::models::{GenerateContentRequest, GenerativeClient};
use crate::router::Intent;
use crate::router::prompts::classifier_prompt;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Trait for intent classification
///
/// Allows handler tests to inject a classifier that makes no network calls.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    /// Classify a user message
    ///
    /// Transport failures propagate; nothing is retried.
    async fn classify(&self, message: &str) -> AppResult<Intent>;
}

/// Classifier backed by a `generateContent` endpoint
pub struct LlmIntentClassifier {
    client: GenerativeClient,
    url: String,
    template: String,
    metrics: Arc<Metrics>,
}

impl LlmIntentClassifier {
    /// Create a classifier
    ///
    /// `template` must contain the `{message}` placeholder; configuration
    /// validation guarantees this for configured prompts.
    pub fn new(
        client: GenerativeClient,
        url: impl Into<String>,
        template: impl Into<String>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            template: template.into(),
            metrics,
        }
    }
}

#[async_trait]
impl IntentClassifier for LlmIntentClassifier {
    async fn classify(&self, message: &str) -> AppResult<Intent> {
        let started = Instant::now();
        let request = GenerateContentRequest::single_turn(classifier_prompt(&self.template, message));

        let response = self.client.generate(&self.url, &request).await;
        self.metrics
            .record_classification_duration(started.elapsed().as_secs_f64() * 1000.0);
        let response = response?;

        if response.candidates.is_empty() {
            tracing::warn!(
                endpoint = %self.url,
                "Classifier returned no candidates, treating message as general"
            );
            return Ok(Intent::General);
        }

        let text = response
            .first_text()
            .ok_or_else(|| AppError::MalformedResponse {
                endpoint: self.url.clone(),
                reason: "first candidate carries no text".to_string(),
            })?;
        let intent = Intent::from_label(text);

        tracing::debug!(
            intent = intent.as_str(),
            latency_ms = started.elapsed().as_millis() as u64,
            "Message classified"
        );
        Ok(intent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StaticTokenProvider;
    use crate::router::prompts::DEFAULT_CLASSIFIER_PROMPT;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn classifier(server: &MockServer) -> LlmIntentClassifier {
        let client = GenerativeClient::new(
            reqwest::Client::new(),
            Arc::new(StaticTokenProvider::new("test-token")),
        );
        LlmIntentClassifier::new(
            client,
            format!("{}/general:generateContent", server.uri()),
            DEFAULT_CLASSIFIER_PROMPT,
            Arc::new(Metrics::new().unwrap()),
        )
    }

    fn reply(text: &str) -> serde_json::Value {
        json!({"candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]})
    }

    #[tokio::test]
    async fn test_classify_not_general() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/general:generateContent"))
            .and(header("authorization", "Bearer test-token"))
            .and(body_string_contains("User message: \\\"check my balance\\\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("Not General\n")))
            .expect(1)
            .mount(&server)
            .await;

        let intent = classifier(&server).classify("check my balance").await.unwrap();
        assert_eq!(intent, Intent::NotGeneral);
    }

    #[tokio::test]
    async fn test_classify_without_candidates_is_general() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&server)
            .await;

        let intent = classifier(&server).classify("hello").await.unwrap();
        assert_eq!(intent, Intent::General);
    }

    #[tokio::test]
    async fn test_classify_candidate_without_text_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"finishReason": "SAFETY"}]
            })))
            .mount(&server)
            .await;

        let err = classifier(&server).classify("hello").await.unwrap_err();
        assert!(matches!(err, AppError::MalformedResponse { .. }));
        assert!(!err.is_transport());
    }

    #[tokio::test]
    async fn test_classify_propagates_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = classifier(&server).classify("hello").await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamStatus { status: 503, .. }));
    }
}
