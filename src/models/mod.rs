//! Generative-model API access
//!
//! Wire types, bearer-token providers and the HTTP client used by the intent
//! classifier and the model router.

pub mod client;
pub mod credentials;
pub mod types;

pub use client::{GenerativeClient, ModelFragmentStream};
pub use credentials::{
    CredentialError, ServiceAccountKey, ServiceAccountTokenProvider, StaticTokenProvider,
    TokenProvider,
};
pub use types::{GenerateContentRequest, GenerateContentResponse, GenerationConfig, Role, Turn};
