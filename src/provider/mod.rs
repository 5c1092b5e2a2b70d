//! Provider abstraction for the upstream text-generation service
//!
//! A [`GenerationClient`] performs exactly one attempt against one model,
//! either buffered (one call, one result) or streaming (one call, a lazy
//! sequence of text fragments ending in a finish signal). Retry, fallback,
//! and continuation live above this seam in the orchestrator.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;
use thiserror::Error;

use crate::error::{AppError, AppResult};

pub mod http;
pub mod sse;

pub use http::HttpGenerationClient;

/// Default sampling temperature when the caller does not override it.
pub const DEFAULT_TEMPERATURE: f64 = 0.6;
/// Default output token budget when the caller does not override it.
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 2048;

/// Why the provider stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The model considered the answer complete.
    NaturalStop,
    /// Generation was cut off by the output-token limit, not by content.
    LengthCapped,
}

/// Immutable generation parameters for one logical request.
///
/// Fields are private so that a constructed request is always valid:
/// non-empty prompt, finite temperature in [0.0, 2.0], positive token budget.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    prompt: String,
    temperature: f64,
    max_output_tokens: u32,
}

impl GenerationRequest {
    /// Create a request with default sampling parameters.
    ///
    /// # Errors
    /// Returns a validation error if the prompt is empty or blank.
    pub fn new(prompt: impl Into<String>) -> AppResult<Self> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(AppError::Validation("prompt must not be empty".to_string()));
        }
        Ok(Self {
            prompt,
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        })
    }

    /// Override the sampling temperature.
    ///
    /// # Errors
    /// Returns a validation error unless the value is finite and in [0.0, 2.0].
    pub fn with_temperature(mut self, temperature: f64) -> AppResult<Self> {
        if !temperature.is_finite() || !(0.0..=2.0).contains(&temperature) {
            return Err(AppError::Validation(format!(
                "temperature must be a finite number between 0.0 and 2.0, got {}",
                temperature
            )));
        }
        self.temperature = temperature;
        Ok(self)
    }

    /// Override the output token budget.
    ///
    /// # Errors
    /// Returns a validation error if the budget is zero.
    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> AppResult<Self> {
        if max_output_tokens == 0 {
            return Err(AppError::Validation(
                "max_output_tokens must be greater than 0".to_string(),
            ));
        }
        self.max_output_tokens = max_output_tokens;
        Ok(self)
    }

    /// Derive a request with the same sampling parameters but a new prompt.
    ///
    /// Used by the continuation loop, which synthesizes its own prompts and
    /// guarantees they are non-empty.
    pub(crate) fn with_prompt(&self, prompt: String) -> Self {
        Self {
            prompt,
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn max_output_tokens(&self) -> u32 {
        self.max_output_tokens
    }
}

/// Result of one successful buffered attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Generated text, guaranteed non-blank by client implementations.
    pub text: String,
    /// How the provider stopped.
    pub finish_reason: FinishReason,
}

/// One element of a streaming attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// A piece of generated text, delivered in order.
    Text(String),
    /// Terminal signal: the provider stopped for the given reason.
    /// Nothing meaningful follows this in the same attempt.
    Finished(FinishReason),
}

/// Lazy, forward-only, non-restartable fragment sequence for one attempt.
///
/// Dropping the stream abandons the underlying transfer, which is the
/// best-effort signal for the provider to stop generating.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<Fragment, ProviderError>> + Send>>;

/// Failures surfaced by a single provider attempt.
///
/// Classification into transient/fatal is the backoff policy's job
/// ([`crate::backoff::BackoffPolicy::classify`]); this enum only records
/// what happened.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider throttled the request (HTTP 429 / RESOURCE_EXHAUSTED).
    #[error("provider rate limited the request: {message}")]
    RateLimited { message: String },

    /// The provider reported overload or unavailability (HTTP 503/529).
    #[error("provider overloaded: {message}")]
    Overloaded { message: String },

    /// The provider answered successfully but with no usable text.
    /// Never surfaced to callers as a valid answer.
    #[error("provider returned an empty completion")]
    EmptyCompletion,

    /// Networking failure before or during the exchange.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The stream ended without reporting a finish reason.
    #[error("stream closed before the provider reported a finish reason")]
    StreamClosed,

    /// Any other provider-reported error.
    #[error("provider error (http {status}): {message}")]
    Api { status: u16, message: String },

    /// The provider's response could not be decoded.
    #[error("failed to decode provider response: {message}")]
    Decode { message: String },
}

/// Single-attempt interface to the upstream generation provider.
///
/// Implementations must be cheap to share (`Arc<dyn GenerationClient>`)
/// and must never return a blank [`Completion`].
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// One buffered request/response call against one model.
    async fn call_buffered(
        &self,
        model: &str,
        request: &GenerationRequest,
    ) -> Result<Completion, ProviderError>;

    /// One streaming call against one model.
    ///
    /// An immediate failure surfaces here; a mid-stream failure surfaces as
    /// an `Err` item inside the returned stream.
    async fn call_streaming(
        &self,
        model: &str,
        request: &GenerationRequest,
    ) -> Result<FragmentStream, ProviderError>;
}
