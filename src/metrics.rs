//! Prometheus metrics collection for chatrelay
//!
//! This module provides metrics instrumentation for tracking:
//! - Chat requests by classified intent
//! - Intent classification latency
//! - Upstream failures by kind
//! - Streamed fragments and mid-stream failures
//! - Access token refreshes
//!
//! Metrics are exposed via the `/metrics` endpoint in Prometheus text format.

use crate::router::Intent;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Metrics collector for chatrelay
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,
    chat_requests: IntCounterVec,
    empty_messages: IntCounter,
    classification_duration: Histogram,
    upstream_failures: IntCounterVec,
    stream_fragments: IntCounter,
    mid_stream_failures: IntCounter,
    token_refreshes: IntCounter,
}

impl Metrics {
    /// Create a new Metrics instance
    ///
    /// Registers all metrics with a new Prometheus registry.
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Cardinality: 2 intents
        let chat_requests = IntCounterVec::new(
            Opts::new(
                "chatrelay_chat_requests_total",
                "Total number of classified chat requests by intent",
            ),
            &["intent"],
        )?;

        let empty_messages = IntCounter::with_opts(Opts::new(
            "chatrelay_empty_messages_total",
            "Total number of chat requests rejected for a missing or empty message",
        ))?;

        let classification_duration = Histogram::with_opts(
            HistogramOpts::new(
                "chatrelay_classification_duration_ms",
                "Intent classification latency in milliseconds",
            )
            .buckets(vec![50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]),
        )?;

        // Labels come from AppError::kind, a closed set
        let upstream_failures = IntCounterVec::new(
            Opts::new(
                "chatrelay_upstream_failures_total",
                "Total number of failed chat requests by failure kind",
            ),
            &["kind"],
        )?;

        let stream_fragments = IntCounter::with_opts(Opts::new(
            "chatrelay_stream_fragments_total",
            "Total number of text fragments relayed to clients over SSE",
        ))?;

        let mid_stream_failures = IntCounter::with_opts(Opts::new(
            "chatrelay_mid_stream_failures_total",
            "Total number of upstream read failures after a stream had started",
        ))?;

        let token_refreshes = IntCounter::with_opts(Opts::new(
            "chatrelay_token_refreshes_total",
            "Total number of access tokens obtained from the token endpoint",
        ))?;

        registry.register(Box::new(chat_requests.clone()))?;
        registry.register(Box::new(empty_messages.clone()))?;
        registry.register(Box::new(classification_duration.clone()))?;
        registry.register(Box::new(upstream_failures.clone()))?;
        registry.register(Box::new(stream_fragments.clone()))?;
        registry.register(Box::new(mid_stream_failures.clone()))?;
        registry.register(Box::new(token_refreshes.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            chat_requests,
            empty_messages,
            classification_duration,
            upstream_failures,
            stream_fragments,
            mid_stream_failures,
            token_refreshes,
        })
    }

    /// Record a classified request
    pub fn record_request(&self, intent: Intent) {
        self.chat_requests
            .with_label_values(&[intent.as_str()])
            .inc();
    }

    pub fn record_empty_message(&self) {
        self.empty_messages.inc();
    }

    /// Record classification latency
    ///
    /// NaN, infinite and negative values are dropped: they would corrupt every
    /// percentile of the histogram.
    pub fn record_classification_duration(&self, duration_ms: f64) {
        if !duration_ms.is_finite() || duration_ms < 0.0 {
            tracing::warn!(duration_ms, "Discarding invalid classification duration");
            return;
        }
        self.classification_duration.observe(duration_ms);
    }

    /// Record a failed request
    pub fn record_failure(&self, kind: &str) {
        self.upstream_failures.with_label_values(&[kind]).inc();
    }

    pub fn stream_fragment(&self) {
        self.stream_fragments.inc();
    }

    pub fn mid_stream_failure(&self) {
        self.mid_stream_failures.inc();
    }

    pub fn token_refreshed(&self) {
        self.token_refreshes.inc();
    }

    pub fn stream_fragments_count(&self) -> u64 {
        self.stream_fragments.get()
    }

    pub fn token_refreshes_count(&self) -> u64 {
        self.token_refreshes.get()
    }

    pub fn failures_count(&self, kind: &str) -> u64 {
        self.upstream_failures.with_label_values(&[kind]).get()
    }

    /// Gather all metrics and encode them in Prometheus text format
    ///
    /// # Errors
    ///
    /// Returns an error if metric encoding fails.
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();

        tracing::debug!(
            metric_family_count = metric_families.len(),
            "Encoding metrics to Prometheus text format"
        );

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&metric_families, &mut buffer)?;

        String::from_utf8(buffer).map_err(|e| {
            prometheus::Error::Msg(format!(
                "Failed to convert metrics to UTF-8 at byte {}: {}",
                e.utf8_error().valid_up_to(),
                e
            ))
        })
    }
}
