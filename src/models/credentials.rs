//! Bearer-token providers for the model API
//!
//! The service-account provider signs a JWT with the account's private key,
//! exchanges it for an OAuth2 access token and caches that token until
//! shortly before it expires. Concurrent callers wait on the same refresh.

use crate::metrics::Metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

/// Default OAuth2 token endpoint used when the key file does not name one
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Lifetime requested for the signed assertion
const ASSERTION_LIFETIME_SECS: u64 = 3600;

/// Tokens this close to expiry are refreshed instead of reused
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Errors raised while obtaining an access token
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Failed to read service account file {path}: {source}")]
    ReadKeyFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid service account key: {0}")]
    InvalidKey(String),

    #[error("Failed to sign token assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("Token request to {token_uri} failed: {reason}")]
    Exchange { token_uri: String, reason: String },

    #[error("Token endpoint {token_uri} returned HTTP {status}: {body}")]
    Rejected {
        token_uri: String,
        status: u16,
        body: String,
    },
}

/// Source of bearer tokens for outbound model calls
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return a token valid for at least the next few seconds
    async fn access_token(&self) -> Result<String, CredentialError>;
}

/// Provider returning a fixed token
///
/// Used for local development against proxies and in tests.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<String, CredentialError> {
        Ok(self.token.clone())
    }
}

/// The fields of a service-account key file this crate needs
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default)]
    private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    /// Load a key from a JSON key file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CredentialError> {
        let path_display = path.as_ref().display().to_string();
        let content = std::fs::read_to_string(path.as_ref()).map_err(|source| {
            CredentialError::ReadKeyFile {
                path: path_display,
                source,
            }
        })?;
        Self::from_json(&content)
    }

    /// Parse a key from JSON text
    pub fn from_json(json: &str) -> Result<Self, CredentialError> {
        let key: Self =
            serde_json::from_str(json).map_err(|e| CredentialError::InvalidKey(e.to_string()))?;
        if key.client_email.trim().is_empty() {
            return Err(CredentialError::InvalidKey(
                "client_email is empty".to_string(),
            ));
        }
        if !key.private_key.contains("PRIVATE KEY") {
            return Err(CredentialError::InvalidKey(
                "private_key is not a PEM private key".to_string(),
            ));
        }
        Ok(key)
    }

    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    pub fn token_uri(&self) -> &str {
        &self.token_uri
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    ASSERTION_LIFETIME_SECS
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Provider exchanging a signed service-account assertion for access tokens
pub struct ServiceAccountTokenProvider {
    key: ServiceAccountKey,
    scopes: Vec<String>,
    token_uri: String,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
    metrics: Arc<Metrics>,
}

impl ServiceAccountTokenProvider {
    /// Create a provider for `key` requesting `scopes`
    ///
    /// `token_uri` overrides the endpoint named in the key file.
    pub fn new(
        key: ServiceAccountKey,
        scopes: Vec<String>,
        token_uri: Option<String>,
        http: reqwest::Client,
        metrics: Arc<Metrics>,
    ) -> Self {
        let token_uri = token_uri.unwrap_or_else(|| key.token_uri.clone());
        Self {
            key,
            scopes,
            token_uri,
            http,
            cached: Mutex::new(None),
            metrics,
        }
    }

    fn signed_assertion(&self) -> Result<String, CredentialError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: self.scopes.join(" "),
            aud: &self.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };

        let mut header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();
        let encoding_key = jsonwebtoken::EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())?;

        Ok(jsonwebtoken::encode(&header, &claims, &encoding_key)?)
    }

    async fn fetch_token(&self) -> Result<CachedToken, CredentialError> {
        let assertion = self.signed_assertion()?;

        let response = self
            .http
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| CredentialError::Exchange {
                token_uri: self.token_uri.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::Rejected {
                token_uri: self.token_uri.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse =
            response
                .json()
                .await
                .map_err(|e| CredentialError::Exchange {
                    token_uri: self.token_uri.clone(),
                    reason: format!("invalid token response: {}", e),
                })?;

        Ok(CachedToken {
            token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }
}

#[async_trait]
impl TokenProvider for ServiceAccountTokenProvider {
    async fn access_token(&self) -> Result<String, CredentialError> {
        let mut cached = self.cached.lock().await;

        if let Some(existing) = cached.as_ref()
            && existing.expires_at > Instant::now() + REFRESH_MARGIN
        {
            return Ok(existing.token.clone());
        }

        tracing::debug!(
            client_email = %self.key.client_email,
            token_uri = %self.token_uri,
            "Refreshing access token"
        );
        let fresh = self.fetch_token().await?;
        self.metrics.token_refreshed();
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }
}
