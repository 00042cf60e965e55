//! Configuration management for chatrelay
//!
//! Parses TOML configuration files and provides typed access to settings.

use crate::error::{AppError, AppResult};
use crate::history::{DEFAULT_IDLE_TTL, DEFAULT_MAX_KEYS};
use crate::models::types::GenerationConfig;
use crate::router::prompts::{
    DEFAULT_CLASSIFIER_PROMPT, DEFAULT_SYSTEM_PROMPT, MESSAGE_PLACEHOLDER,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Upper bound for `history.max_turns`
const MAX_HISTORY_TURNS: usize = 1000;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Take the client identifier from `X-Forwarded-For` instead of the peer
    /// address. Only enable behind a reverse proxy that sets the header.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

/// Model endpoints
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelsConfig {
    /// General-purpose model: intent classification and streamed replies
    pub general: GeneralModelConfig,
    /// Fine-tuned model: domain-specific replies
    pub tuned: TunedModelConfig,
}

/// General-purpose model endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneralModelConfig {
    url: String,
    /// Endpoint for streamed replies; defaults to `url`
    #[serde(default)]
    stream_url: Option<String>,
}

impl GeneralModelConfig {
    /// Endpoint used for single-shot calls (intent classification)
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Endpoint used for streamed replies
    pub fn stream_url(&self) -> &str {
        self.stream_url.as_deref().unwrap_or(&self.url)
    }
}

/// Fine-tuned model endpoint and its sampling parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TunedModelConfig {
    url: String,
    #[serde(default = "default_temperature")]
    temperature: f64,
    #[serde(default = "default_top_p")]
    top_p: f64,
    #[serde(default = "default_top_k")]
    top_k: u32,
    #[serde(default = "default_max_output_tokens")]
    max_output_tokens: u32,
}

impl TunedModelConfig {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sampling parameters sent with every fine-tuned model call
    pub fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            max_output_tokens: self.max_output_tokens,
        }
    }
}

fn default_temperature() -> f64 {
    0.3
}

fn default_top_p() -> f64 {
    0.8
}

fn default_top_k() -> u32 {
    40
}

fn default_max_output_tokens() -> u32 {
    1024
}

/// Where bearer tokens for the model API come from
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum CredentialsConfig {
    /// Google service-account key file exchanged for OAuth2 access tokens
    ServiceAccount {
        path: String,
        #[serde(default = "default_scopes")]
        scopes: Vec<String>,
        /// Overrides the token endpoint named in the key file
        #[serde(default)]
        token_uri: Option<String>,
    },
    /// A fixed bearer token
    Static { token: String },
}

fn default_scopes() -> Vec<String> {
    vec!["https://www.googleapis.com/auth/cloud-platform".to_string()]
}

/// Conversation history settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HistoryConfig {
    #[serde(default = "default_max_turns")]
    max_turns: usize,
    #[serde(default = "default_key_prefix")]
    key_prefix: String,
    /// Most clients whose history is kept at once
    #[serde(default = "default_max_clients")]
    max_clients: usize,
    /// Seconds without a write after which a client's history is dropped
    #[serde(default = "default_idle_ttl_secs")]
    idle_ttl_secs: u64,
}

impl HistoryConfig {
    /// Maximum number of turns kept per user
    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Prefix of the per-user store key
    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            key_prefix: default_key_prefix(),
            max_clients: default_max_clients(),
            idle_ttl_secs: default_idle_ttl_secs(),
        }
    }
}

fn default_max_turns() -> usize {
    10
}

fn default_key_prefix() -> String {
    "history:".to_string()
}

fn default_max_clients() -> usize {
    DEFAULT_MAX_KEYS
}

fn default_idle_ttl_secs() -> u64 {
    DEFAULT_IDLE_TTL.as_secs()
}

/// Instruction prompts
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PromptsConfig {
    /// System prompt for general conversations and the fine-tuned model
    #[serde(default = "default_system_prompt")]
    system: String,
    /// Classifier instructions; `{message}` is replaced by the user's text
    #[serde(default = "default_classifier_prompt")]
    classifier: String,
}

impl PromptsConfig {
    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn classifier(&self) -> &str {
        &self.classifier
    }
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            system: default_system_prompt(),
            classifier: default_classifier_prompt(),
        }
    }
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_classifier_prompt() -> String {
    DEFAULT_CLASSIFIER_PROMPT.to_string()
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn validate_url(field: &str, url: &str) -> AppResult<()> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(AppError::Config(format!(
            "{} has invalid URL '{}'. URLs must start with 'http://' or 'https://'.",
            field, url
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        // Phase 1: Read file (preserves io::Error context)
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|source| AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            })?;

        // Phase 2: Parse TOML (preserves toml::de::Error context)
        let config: Self =
            toml::from_str(&content).map_err(|source| AppError::ConfigParseFailed {
                path: path_display.clone(),
                source,
            })?;

        // Phase 3: Validate parsed config
        config
            .validate()
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Validate configuration after parsing
    ///
    /// This is called automatically by `from_file()` and `from_str()`.
    pub fn validate(&self) -> AppResult<()> {
        validate_url("models.general.url", self.models.general.url())?;
        if let Some(stream_url) = &self.models.general.stream_url {
            validate_url("models.general.stream_url", stream_url)?;
        }
        validate_url("models.tuned.url", self.models.tuned.url())?;

        let tuned = &self.models.tuned;
        if !tuned.temperature.is_finite() || !(0.0..=2.0).contains(&tuned.temperature) {
            return Err(AppError::Config(format!(
                "models.tuned.temperature must be a finite number between 0.0 and 2.0, got {}",
                tuned.temperature
            )));
        }
        if !tuned.top_p.is_finite() || tuned.top_p <= 0.0 || tuned.top_p > 1.0 {
            return Err(AppError::Config(format!(
                "models.tuned.top_p must be in (0.0, 1.0], got {}",
                tuned.top_p
            )));
        }
        if tuned.top_k == 0 {
            return Err(AppError::Config(
                "models.tuned.top_k must be greater than 0".to_string(),
            ));
        }
        if tuned.max_output_tokens == 0 {
            return Err(AppError::Config(
                "models.tuned.max_output_tokens must be greater than 0".to_string(),
            ));
        }

        match &self.credentials {
            CredentialsConfig::ServiceAccount {
                path,
                scopes,
                token_uri,
            } => {
                if path.trim().is_empty() {
                    return Err(AppError::Config(
                        "credentials.path cannot be empty".to_string(),
                    ));
                }
                if scopes.is_empty() {
                    return Err(AppError::Config(
                        "credentials.scopes must name at least one scope".to_string(),
                    ));
                }
                if let Some(uri) = token_uri {
                    validate_url("credentials.token_uri", uri)?;
                }
            }
            CredentialsConfig::Static { token } => {
                if token.trim().is_empty() {
                    return Err(AppError::Config(
                        "credentials.token cannot be empty".to_string(),
                    ));
                }
            }
        }

        if self.history.max_turns == 0 || self.history.max_turns > MAX_HISTORY_TURNS {
            return Err(AppError::Config(format!(
                "history.max_turns must be between 1 and {}, got {}",
                MAX_HISTORY_TURNS, self.history.max_turns
            )));
        }

        if self.history.max_clients == 0 {
            return Err(AppError::Config(
                "history.max_clients must be at least 1".to_string(),
            ));
        }

        if self.history.idle_ttl_secs == 0 {
            return Err(AppError::Config(
                "history.idle_ttl_secs must be at least 1".to_string(),
            ));
        }

        if !self.prompts.classifier.contains(MESSAGE_PLACEHOLDER) {
            return Err(AppError::Config(format!(
                "prompts.classifier must contain the {} placeholder",
                MESSAGE_PLACEHOLDER
            )));
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = AppError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config =
            toml::from_str(toml_str).map_err(|source| AppError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }
}
