//! chatrelay - intent-routing chat relay for hosted generative models
//!
//! Each chat message is classified by a general-purpose model. Domain-specific
//! requests are answered in one call by a fine-tuned model; everything else is
//! streamed from the general-purpose model as server-sent events, with a short
//! per-client conversation history replayed as context.

pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod history;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod router;
pub mod stream;
pub mod telemetry;
