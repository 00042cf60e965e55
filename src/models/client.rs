//! HTTP client for the generative-model API
//!
//! Every call fetches a bearer token from the configured [`TokenProvider`],
//! posts a JSON body and fails on any non-2xx status. Nothing is retried.

use crate::error::{AppError, AppResult};
use crate::models::credentials::TokenProvider;
use crate::models::types::{GenerateContentRequest, GenerateContentResponse};
use crate::stream::FragmentStream;
use axum::body::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::sync::Arc;

/// Raw response body of a streaming call
pub type UpstreamBytes = BoxStream<'static, Result<Bytes, reqwest::Error>>;

/// Text fragments of a streaming call, in arrival order
pub type ModelFragmentStream = FragmentStream<UpstreamBytes>;

/// Client for `generateContent`-style endpoints
#[derive(Clone)]
pub struct GenerativeClient {
    http: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
}

impl GenerativeClient {
    pub fn new(http: reqwest::Client, tokens: Arc<dyn TokenProvider>) -> Self {
        Self { http, tokens }
    }

    async fn send(&self, url: &str, request: &GenerateContentRequest) -> AppResult<reqwest::Response> {
        let token = self.tokens.access_token().await?;

        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(endpoint = %url, error = %e, "Failed to send model request");
                AppError::UpstreamTransport {
                    endpoint: url.to_string(),
                    reason: e.to_string(),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                endpoint = %url,
                status = status.as_u16(),
                body = %body,
                "Model endpoint returned an error status"
            );
            return Err(AppError::UpstreamStatus {
                endpoint: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    /// Make a single-shot call and decode the whole response
    pub async fn generate(
        &self,
        url: &str,
        request: &GenerateContentRequest,
    ) -> AppResult<GenerateContentResponse> {
        let response = self.send(url, request).await?;

        response.json::<GenerateContentResponse>().await.map_err(|e| {
            if e.is_decode() {
                AppError::MalformedResponse {
                    endpoint: url.to_string(),
                    reason: e.to_string(),
                }
            } else {
                AppError::UpstreamTransport {
                    endpoint: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })
    }

    /// Open a streaming call and decode fragments as bytes arrive
    ///
    /// Returns once response headers are received; status errors surface here,
    /// read errors surface as stream items.
    pub async fn stream_generate(
        &self,
        url: &str,
        request: &GenerateContentRequest,
    ) -> AppResult<ModelFragmentStream> {
        let response = self.send(url, request).await?;
        tracing::debug!(endpoint = %url, "Streaming response started");
        Ok(FragmentStream::new(response.bytes_stream().boxed()))
    }
}
