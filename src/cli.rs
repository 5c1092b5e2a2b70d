//! Command-line interface for modelrelay
//!
//! Provides argument parsing and subcommand handling for the modelrelay binary.

use clap::{Parser, Subcommand};

/// Resilient LLM request orchestrator with model fallback
#[derive(Parser)]
#[command(name = "modelrelay")]
#[command(version)]
#[command(about = "Resilient LLM request orchestrator with model fallback")]
#[command(
    long_about = "Modelrelay turns an unreliable, rate-limited, length-capped generation \
    provider into a dependable completion and streaming service: ordered model fallback, \
    bounded-backoff retries, and transparent continuation of length-capped generations."
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
    r#"# Modelrelay Configuration
# ========================
#
# This file configures the HTTP server, the upstream provider, the model
# fallback roster, retry behavior, and streaming delivery.

# ─────────────────────────────────────────────────────────────────────────────
# SERVER CONFIGURATION
# ─────────────────────────────────────────────────────────────────────────────

[server]
# IP address to bind to (0.0.0.0 for all interfaces, 127.0.0.1 for localhost only)
host = "0.0.0.0"

# Port to listen on
port = 4000

# Timeout for buffered provider calls, in seconds (streams are open-ended)
request_timeout_seconds = 30

# ─────────────────────────────────────────────────────────────────────────────
# PROVIDER
# ─────────────────────────────────────────────────────────────────────────────

[provider]
# Base URL of the GenerateContent-compatible provider
base_url = "https://generativelanguage.googleapis.com"

# Name of the environment variable holding the API key. The key itself
# never goes in this file.
api_key_env = "GEMINI_API_KEY"

# ─────────────────────────────────────────────────────────────────────────────
# MODEL ROSTER
# ─────────────────────────────────────────────────────────────────────────────
#
# The primary model is tried first; fallbacks are tried in order when a
# model is unavailable, overloaded, or keeps failing. Order matters.

[models]
primary = "gemini-2.5-pro"
fallbacks = ["gemini-2.5-flash"]

# ─────────────────────────────────────────────────────────────────────────────
# GENERATION DEFAULTS
# ─────────────────────────────────────────────────────────────────────────────
#
# Applied when a request does not override them.

[generation]
# Sampling temperature (0.0-2.0)
temperature = 0.6

# Output token budget per provider call. Generations that hit this cap are
# continued transparently in streaming mode.
max_output_tokens = 2048

# ─────────────────────────────────────────────────────────────────────────────
# RETRY (buffered requests)
# ─────────────────────────────────────────────────────────────────────────────

[retry]
# Attempts per model before falling back to the next one
max_attempts = 4

# Base backoff in milliseconds; doubles each attempt, capped at 30s,
# plus random jitter
backoff_ms = 500

# ─────────────────────────────────────────────────────────────────────────────
# STREAMING
# ─────────────────────────────────────────────────────────────────────────────

[stream]
# Keepalive ping interval for SSE connections, in seconds
keepalive_seconds = 15

# Trailing characters remembered for continuation overlap deduplication
tail_chars = 100

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# Log level: "trace", "debug", "info", "warn", "error"
log_level = "info"

# Prometheus metrics are always available at /metrics on the server port
"#
}
