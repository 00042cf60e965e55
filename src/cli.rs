//! Command-line interface for chatrelay

use clap::{Parser, Subcommand};

/// Intent-routing chat relay for hosted generative models
#[derive(Parser)]
#[command(name = "chatrelay")]
#[command(version)]
#[command(about = "Intent-routing chat relay for hosted generative models")]
#[command(
    long_about = "chatrelay classifies each chat message with a general-purpose model, \
    answers domain-specific requests with a fine-tuned model and streams everything \
    else from the general-purpose model, keeping a short per-client history."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# chatrelay configuration

# ─────────────────────────────────────────────────────────────────────────────
# SERVER
# ─────────────────────────────────────────────────────────────────────────────

[server]
# IP address to bind to (0.0.0.0 for all interfaces, 127.0.0.1 for localhost only)
host = "0.0.0.0"
port = 5000

# Key conversation history by the first X-Forwarded-For entry instead of the
# peer address. Only enable behind a proxy that sets the header.
trust_forwarded_for = false

# ─────────────────────────────────────────────────────────────────────────────
# MODELS
# ─────────────────────────────────────────────────────────────────────────────

# General-purpose model: classifies every message and streams general replies
[models.general]
url = "https://us-central1-aiplatform.googleapis.com/v1/projects/YOUR_PROJECT/locations/us-central1/publishers/google/models/gemini-2.0-flash-001:generateContent"
# Streaming endpoint (defaults to url)
# stream_url = "https://us-central1-aiplatform.googleapis.com/v1/projects/YOUR_PROJECT/locations/us-central1/publishers/google/models/gemini-2.0-flash-001:streamGenerateContent"

# Fine-tuned model: answers domain-specific requests in one call
[models.tuned]
url = "https://us-central1-aiplatform.googleapis.com/v1/projects/YOUR_PROJECT/locations/us-central1/endpoints/YOUR_ENDPOINT:generateContent"
temperature = 0.3
top_p = 0.8
top_k = 40
max_output_tokens = 1024

# ─────────────────────────────────────────────────────────────────────────────
# CREDENTIALS
# ─────────────────────────────────────────────────────────────────────────────

[credentials]
# "service_account": exchange a service-account key for OAuth2 access tokens
# "static": send a fixed bearer token (development only)
source = "service_account"
path = "/etc/chatrelay/service-account.json"
scopes = ["https://www.googleapis.com/auth/cloud-platform"]

# ─────────────────────────────────────────────────────────────────────────────
# HISTORY
# ─────────────────────────────────────────────────────────────────────────────

[history]
# Turns kept per client (1-1000)
max_turns = 10
key_prefix = "history:"
# Clients whose history is kept at once; the least recently active is dropped
max_clients = 10000
# Drop a client's history after this many seconds without a message
idle_ttl_secs = 86400

# ─────────────────────────────────────────────────────────────────────────────
# PROMPTS (optional, built-in defaults are used when omitted)
# ─────────────────────────────────────────────────────────────────────────────
#
# [prompts]
# system = "You are a friendly and helpful assistant."
# classifier = "Reply with general or not general. User message: \"{message}\""

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# Log level: "trace", "debug", "info", "warn", "error"
log_level = "info"

# Prometheus metrics are always available at /metrics on the server port
"#
}
