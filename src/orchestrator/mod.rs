//! Request orchestration across the model roster
//!
//! Composes the roster, the backoff policy, and a generation client into
//! the two public operations: [`RequestOrchestrator::complete`] (buffered)
//! and [`RequestOrchestrator::stream`] (incremental). Fallback is strictly
//! sequential: at most one model is active at a time, so `model_used` is
//! always unambiguous and an overloaded provider is never hit twice at once
//! for the same request.

pub mod continuation;
pub mod dedupe;

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::backoff::{BackoffPolicy, DEFAULT_MAX_ATTEMPTS, ErrorClass};
use crate::metrics::{Metrics, RequestMode};
use crate::provider::{FinishReason, GenerationClient, GenerationRequest, ProviderError};
use crate::roster::ModelRoster;
use continuation::{ContinuationController, ControllerOutcome};
use dedupe::DEFAULT_TAIL_CHARS;

/// Buffer between the stream worker and the consumer. Small on purpose:
/// backpressure suspends the provider read instead of piling up chunks for
/// a slow consumer.
const CHUNK_CHANNEL_CAPACITY: usize = 32;

/// Unit of delivery for a streaming request.
///
/// Exactly one terminal chunk (`Done` xor `Error`) ends every stream, and
/// no chunk follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    /// A deduplicated piece of generated text.
    Text(String),
    /// Provider finish signal for the model currently serving the stream.
    Meta {
        model: String,
        finish_reason: FinishReason,
    },
    /// Terminal failure: every model in the roster was exhausted.
    Error { message: String },
    /// Terminal success marker.
    Done,
}

/// Result of a successful buffered request.
#[derive(Debug, Clone)]
pub struct CompleteOutcome {
    /// The generated text, guaranteed non-blank.
    pub text: String,
    /// The model that ultimately served the request.
    pub model_used: String,
}

/// The only failure a caller ever sees: the whole roster was exhausted.
/// Everything below this level is recovered internally by retry or fallback.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(
        "all models failed ({models}); last error: {last_error}",
        models = .models_tried.join(", ")
    )]
    RosterExhausted {
        models_tried: Vec<String>,
        last_error: ProviderError,
    },
}

/// Per-model attempt bookkeeping for buffered requests.
///
/// Reset when moving to the next model, discarded on success.
#[derive(Debug, Default)]
struct RetryState {
    attempts: usize,
    last_error: Option<ProviderError>,
}

impl RetryState {
    fn record(&mut self, error: ProviderError) {
        self.attempts += 1;
        self.last_error = Some(error);
    }

    fn into_last_error(self) -> Option<ProviderError> {
        self.last_error
    }
}

/// Orchestrates generation requests over an ordered model roster.
///
/// Holds only immutable, process-wide configuration plus the injected
/// client; safe to share across concurrent requests behind an `Arc`.
pub struct RequestOrchestrator {
    roster: Arc<ModelRoster>,
    policy: BackoffPolicy,
    client: Arc<dyn GenerationClient>,
    metrics: Arc<Metrics>,
    max_attempts: usize,
    tail_chars: usize,
}

impl RequestOrchestrator {
    pub fn new(
        roster: ModelRoster,
        policy: BackoffPolicy,
        client: Arc<dyn GenerationClient>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            roster: Arc::new(roster),
            policy,
            client,
            metrics,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            tail_chars: DEFAULT_TAIL_CHARS,
        }
    }

    /// Override attempts per model (minimum 1).
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Override the trailing-context length used for continuations.
    pub fn with_tail_chars(mut self, tail_chars: usize) -> Self {
        self.tail_chars = tail_chars.max(1);
        self
    }

    pub fn roster(&self) -> &ModelRoster {
        &self.roster
    }

    /// Buffered request: retries transient failures per model with backoff,
    /// falls back through the roster, returns the first success.
    pub async fn complete(
        &self,
        request: &GenerationRequest,
    ) -> Result<CompleteOutcome, OrchestratorError> {
        self.metrics.record_request(RequestMode::Complete);

        let mut last_error: Option<ProviderError> = None;
        let mut models_tried = Vec::with_capacity(self.roster.len());

        for (model_index, model) in self.roster.iter().enumerate() {
            if model_index > 0 {
                self.metrics.record_fallback();
            }
            models_tried.push(model.to_string());
            let mut retry = RetryState::default();

            'attempts: for attempt in 0..self.max_attempts {
                let outcome = match self.client.call_buffered(model, request).await {
                    // Guard the client contract at this seam as well: blank
                    // text is never a valid answer.
                    Ok(completion) if completion.text.trim().is_empty() => {
                        Err(ProviderError::EmptyCompletion)
                    }
                    other => other,
                };

                match outcome {
                    Ok(completion) => {
                        tracing::info!(
                            model = %model,
                            attempt = attempt,
                            response_length = completion.text.len(),
                            "Buffered request served"
                        );
                        return Ok(CompleteOutcome {
                            text: completion.text,
                            model_used: model.to_string(),
                        });
                    }
                    Err(error) => match self.policy.classify(&error) {
                        ErrorClass::Transient => {
                            tracing::warn!(
                                model = %model,
                                attempt = attempt,
                                max_attempts = self.max_attempts,
                                error = %error,
                                "Transient provider failure"
                            );
                            retry.record(error);
                            if attempt + 1 < self.max_attempts {
                                self.metrics.record_retry();
                                tokio::time::sleep(self.policy.delay(attempt)).await;
                            }
                        }
                        ErrorClass::Fatal => {
                            tracing::warn!(
                                model = %model,
                                attempt = attempt,
                                error = %error,
                                "Fatal provider failure, abandoning model"
                            );
                            retry.record(error);
                            break 'attempts;
                        }
                    },
                }
            }

            last_error = retry.into_last_error().or(last_error);
        }

        self.metrics.record_roster_exhausted();
        tracing::error!(
            models_tried = ?models_tried,
            max_attempts = self.max_attempts,
            "Every model in the roster failed"
        );
        Err(OrchestratorError::RosterExhausted {
            models_tried,
            last_error: last_error.unwrap_or_else(|| {
                // Unreachable with a non-empty roster and >= 1 attempt.
                tracing::error!("BUG: roster exhausted without a recorded error");
                ProviderError::Transport {
                    message: "no attempts recorded".to_string(),
                }
            }),
        })
    }

    /// Streaming request: one continuation-driven run per model, falling
    /// back through the roster without retracting delivered text.
    ///
    /// The returned stream owns the worker task; dropping it cancels the
    /// request and tears down any in-flight provider call.
    pub fn stream(&self, request: GenerationRequest) -> ChunkStream {
        self.metrics.record_request(RequestMode::Stream);

        let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        let roster = Arc::clone(&self.roster);
        let client = Arc::clone(&self.client);
        let metrics = Arc::clone(&self.metrics);
        let tail_chars = self.tail_chars;

        let worker = tokio::spawn(async move {
            drive_stream(roster, client, metrics, tail_chars, request, tx).await;
        });

        ChunkStream { rx, worker }
    }
}

async fn drive_stream(
    roster: Arc<ModelRoster>,
    client: Arc<dyn GenerationClient>,
    metrics: Arc<Metrics>,
    tail_chars: usize,
    request: GenerationRequest,
    tx: mpsc::Sender<StreamChunk>,
) {
    let mut last_error: Option<ProviderError> = None;
    let mut models_tried = Vec::with_capacity(roster.len());

    for (model_index, model) in roster.iter().enumerate() {
        if model_index > 0 {
            metrics.record_fallback();
        }
        models_tried.push(model.to_string());

        let controller =
            ContinuationController::new(client.as_ref(), &metrics, model, tail_chars);
        match controller.run(&request, &tx).await {
            ControllerOutcome::Finished => return,
            ControllerOutcome::Cancelled => {
                tracing::debug!(model = %model, "Stream cancelled by caller");
                return;
            }
            ControllerOutcome::Failed {
                error,
                emitted_text,
            } => {
                tracing::warn!(
                    model = %model,
                    error = %error,
                    emitted_text = emitted_text,
                    "Model failed during streaming, falling back"
                );
                last_error = Some(error);
            }
        }
    }

    metrics.record_roster_exhausted();
    let error = OrchestratorError::RosterExhausted {
        models_tried,
        last_error: last_error.unwrap_or_else(|| {
            tracing::error!("BUG: streaming roster exhausted without a recorded error");
            ProviderError::Transport {
                message: "no attempts recorded".to_string(),
            }
        }),
    };
    // Best effort: the receiver may already be gone.
    let _ = tx.send(StreamChunk::Error {
        message: error.to_string(),
    })
    .await;
}

/// Live chunk sequence for one streaming request.
///
/// Owns the worker task driving the roster; dropping the stream aborts the
/// worker, which drops any open provider stream and continuation state.
pub struct ChunkStream {
    rx: mpsc::Receiver<StreamChunk>,
    worker: JoinHandle<()>,
}

impl Stream for ChunkStream {
    type Item = StreamChunk;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl Drop for ChunkStream {
    fn drop(&mut self) {
        self.worker.abort();
    }
}
