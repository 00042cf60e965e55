//! HTTP request handlers for chatrelay

use crate::config::{Config, CredentialsConfig};
use crate::error::{AppError, AppResult};
use crate::history::{ConversationHistory, InMemoryHistoryStore};
use crate::metrics::Metrics;
use crate::middleware::request_id_middleware;
use crate::models::{
    GenerativeClient, ServiceAccountKey, ServiceAccountTokenProvider, StaticTokenProvider,
    TokenProvider,
};
use crate::router::{IntentClassifier, LlmIntentClassifier, ModelEndpoints, ModelRouter};
use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;

pub mod chat;
pub mod health;
pub mod index;
pub mod metrics;

/// Application state shared across all handlers
///
/// Built once at startup. All fields are Arc'd for cheap cloning across Axum
/// handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    classifier: Arc<dyn IntentClassifier>,
    router: Arc<ModelRouter>,
    history: ConversationHistory,
    metrics: Arc<Metrics>,
}

impl AppState {
    /// Create a new AppState from configuration
    ///
    /// Loads the service-account key when one is configured. Access tokens are
    /// fetched lazily on the first model call.
    pub fn new(config: Config) -> AppResult<Self> {
        let metrics = Arc::new(
            Metrics::new()
                .map_err(|e| AppError::Internal(format!("failed to register metrics: {}", e)))?,
        );

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {}", e)))?;

        let tokens: Arc<dyn TokenProvider> = match &config.credentials {
            CredentialsConfig::ServiceAccount {
                path,
                scopes,
                token_uri,
            } => {
                let key = ServiceAccountKey::from_file(path)?;
                tracing::info!(
                    client_email = %key.client_email(),
                    "Loaded service-account credentials"
                );
                Arc::new(ServiceAccountTokenProvider::new(
                    key,
                    scopes.clone(),
                    token_uri.clone(),
                    http.clone(),
                    metrics.clone(),
                ))
            }
            CredentialsConfig::Static { token } => {
                tracing::warn!("Using a static bearer token for model calls");
                Arc::new(StaticTokenProvider::new(token.clone()))
            }
        };

        let client = GenerativeClient::new(http, tokens);
        let history = ConversationHistory::new(
            Arc::new(InMemoryHistoryStore::with_limits(
                config.history.max_clients(),
                config.history.idle_ttl(),
            )),
            config.history.max_turns(),
            config.history.key_prefix(),
        );

        let classifier = Arc::new(LlmIntentClassifier::new(
            client.clone(),
            config.models.general.url(),
            config.prompts.classifier(),
            metrics.clone(),
        ));

        let router = Arc::new(ModelRouter::new(
            client,
            history.clone(),
            ModelEndpoints {
                stream_url: config.models.general.stream_url().to_string(),
                tuned_url: config.models.tuned.url().to_string(),
            },
            config.models.tuned.generation_config(),
            config.prompts.system(),
            metrics.clone(),
        ));

        Ok(Self::from_parts(config, classifier, router, history, metrics))
    }

    /// Assemble state from already-built components
    pub fn from_parts(
        config: Config,
        classifier: Arc<dyn IntentClassifier>,
        router: Arc<ModelRouter>,
        history: ConversationHistory,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            classifier,
            router,
            history,
            metrics,
        }
    }

    /// Get reference to the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get reference to the intent classifier
    pub fn classifier(&self) -> &dyn IntentClassifier {
        self.classifier.as_ref()
    }

    /// Get reference to the model router
    pub fn router(&self) -> &ModelRouter {
        &self.router
    }

    /// Get reference to the conversation history
    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Get shared metrics handle
    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }
}

/// Build the HTTP router with every endpoint and the request-id layer
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index::handler))
        .route("/chat", post(chat::handler))
        .route("/health", get(health::handler))
        .route("/metrics", get(metrics::handler))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    const STATIC_CONFIG: &str = r#"
[server]
host = "127.0.0.1"
port = 5000

[models.general]
url = "http://localhost:9000/general:generateContent"

[models.tuned]
url = "http://localhost:9000/tuned:generateContent"

[credentials]
source = "static"
token = "dev-token"

[history]
max_turns = 4
"#;

    #[test]
    fn test_appstate_new_with_static_token() {
        let config = Config::from_str(STATIC_CONFIG).unwrap();
        let state = AppState::new(config).expect("state should build");

        assert_eq!(state.config().server.port, 5000);
        assert_eq!(state.history().max_turns(), 4);
    }

    #[test]
    fn test_appstate_new_fails_for_missing_key_file() {
        let config_str = STATIC_CONFIG.replace(
            "source = \"static\"\ntoken = \"dev-token\"",
            "source = \"service_account\"\npath = \"/nonexistent/key.json\"",
        );
        let config = Config::from_str(&config_str).unwrap();

        let result = AppState::new(config);
        assert!(matches!(result, Err(AppError::Credentials(_))));
    }

    #[test]
    fn test_appstate_new_with_service_account_fixture() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/service_account.json");
        let config_str = STATIC_CONFIG.replace(
            "source = \"static\"\ntoken = \"dev-token\"",
            &format!("source = \"service_account\"\npath = \"{}\"", path),
        );
        let config = Config::from_str(&config_str).unwrap();

        assert!(AppState::new(config).is_ok());
    }

    #[test]
    fn test_appstate_is_clonable() {
        let state = AppState::new(Config::from_str(STATIC_CONFIG).unwrap()).unwrap();
        let state2 = state.clone();
        assert_eq!(state2.config().server.port, 5000);
    }
}
