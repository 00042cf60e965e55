//! Error types for chatrelay
//!
//! All errors implement `IntoResponse` for Axum handlers. The HTTP surface only
//! distinguishes a handful of fixed user-facing replies; the variants exist so
//! logs keep the real cause.

use crate::models::credentials::CredentialError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Fixed user-facing reply texts
pub mod replies {
    /// Sent with 200 when the request carries no message
    pub const EMPTY_MESSAGE: &str =
        "ကျေးဇူးပြု၍ မေးခွန်းတစ်ခုကို ရေးသားထည့်သွင်းပေးပါ။";

    /// Sent with 500 when the fine-tuned model returns no candidates
    pub const NO_RESPONSE: &str = "ဝန်ဆောင်မှုမှ တုံ့ပြန်မှုမရရှိပါ။";

    /// Sent with 500 when an upstream HTTP call fails
    pub const NETWORK_ERROR: &str = "အင်တာနက်ချိတ်ဆက်မှုမရှိပါ။";

    /// Sent with 500 for every other failure
    pub const GENERIC_ERROR: &str = "တစ်ခုခုမှားယွင်းသွားပါသည်။";
}

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file {path}: {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration in {path}: {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    #[error("Credential error: {0}")]
    Credentials(#[from] CredentialError),

    #[error("Request to {endpoint} failed: {reason}")]
    UpstreamTransport { endpoint: String, reason: String },

    #[error("{endpoint} returned HTTP {status}: {body}")]
    UpstreamStatus {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("{endpoint} returned no candidates")]
    NoCandidates { endpoint: String },

    #[error("Malformed response from {endpoint}: {reason}")]
    MalformedResponse { endpoint: String, reason: String },

    #[error("History store error: {0}")]
    History(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns true for failures of an HTTP exchange with the model API or
    /// the token endpoint
    ///
    /// These are answered with the network apology; everything else gets the
    /// generic reply.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::UpstreamTransport { .. }
                | Self::UpstreamStatus { .. }
                | Self::Credentials(
                    CredentialError::Exchange { .. } | CredentialError::Rejected { .. }
                )
        )
    }

    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_)
            | Self::ConfigFileRead { .. }
            | Self::ConfigParseFailed { .. }
            | Self::ConfigValidationFailed { .. } => "config",
            Self::Credentials(_) => "credentials",
            Self::UpstreamTransport { .. } => "transport",
            Self::UpstreamStatus { .. } => "status",
            Self::NoCandidates { .. } => "no_candidates",
            Self::MalformedResponse { .. } => "malformed",
            Self::History(_) => "history",
            Self::Internal(_) => "internal",
        }
    }

    /// The fixed reply text sent to the client for this error
    pub fn reply_text(&self) -> &'static str {
        match self {
            Self::NoCandidates { .. } => replies::NO_RESPONSE,
            e if e.is_transport() => replies::NETWORK_ERROR,
            _ => replies::GENERIC_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.is_transport() {
            tracing::error!(error = %self, kind = self.kind(), "HTTP request error");
        } else {
            tracing::error!(error = %self, kind = self.kind(), "General error");
        }

        let body = Json(serde_json::json!({
            "reply": self.reply_text(),
        }));

        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;
