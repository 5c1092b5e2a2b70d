//! HTTP request handlers for the modelrelay API

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::backoff::BackoffPolicy;
use crate::config::Config;
use crate::error::AppResult;
use crate::metrics::Metrics;
use crate::orchestrator::RequestOrchestrator;
use crate::provider::{GenerationClient, GenerationRequest, HttpGenerationClient};

pub mod complete;
pub mod health;
pub mod metrics;
pub mod stream;

/// Request body shared by `/api/complete` and `/api/stream`.
///
/// Omitted sampling parameters fall back to the configured defaults.
#[derive(Debug, Deserialize)]
pub struct GenerationParams {
    pub prompt: String,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
}

impl GenerationParams {
    /// Resolve into a validated [`GenerationRequest`] against the config
    /// defaults.
    pub fn resolve(&self, config: &Config) -> AppResult<GenerationRequest> {
        GenerationRequest::new(self.prompt.clone())?
            .with_temperature(
                self.temperature
                    .unwrap_or_else(|| config.generation.temperature()),
            )?
            .with_max_output_tokens(
                self.max_output_tokens
                    .unwrap_or_else(|| config.generation.max_output_tokens()),
            )
    }
}

/// Application state shared across all handlers
///
/// Contains configuration, the orchestrator, and metrics.
/// All fields are Arc'd for cheap cloning across Axum handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    orchestrator: Arc<RequestOrchestrator>,
    metrics: Arc<Metrics>,
}

impl AppState {
    /// Create state with the production HTTP client, resolving the provider
    /// credential from the environment.
    pub fn new(config: Config) -> AppResult<Self> {
        let api_key = config.provider.resolve_api_key()?;
        let client = HttpGenerationClient::new(
            config.provider.base_url.clone(),
            api_key,
            Duration::from_secs(config.server.request_timeout_seconds),
        )?;
        Self::with_client(config, Arc::new(client))
    }

    /// Create state with an injected generation client (tests, alternative
    /// providers).
    pub fn with_client(config: Config, client: Arc<dyn GenerationClient>) -> AppResult<Self> {
        let metrics = Arc::new(Metrics::new()?);
        let roster = config.models.roster()?;
        let policy = BackoffPolicy::new(config.retry.backoff_ms());
        let orchestrator = RequestOrchestrator::new(roster, policy, client, Arc::clone(&metrics))
            .with_max_attempts(config.retry.max_attempts())
            .with_tail_chars(config.stream.tail_chars());

        Ok(Self {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
            metrics,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn orchestrator(&self) -> &RequestOrchestrator {
        &self.orchestrator
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}
