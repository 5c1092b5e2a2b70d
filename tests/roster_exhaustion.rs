//! Integration tests for whole-roster exhaustion
//!
//! Exhaustion is the only failure a caller ever sees. These tests verify
//! that both operations terminate (no hang) when every model fails, that
//! the aggregated error names the models tried and the last failure, and
//! that an empty provider response is never surfaced as success.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use modelrelay::backoff::BackoffPolicy;
use modelrelay::metrics::Metrics;
use modelrelay::orchestrator::{OrchestratorError, RequestOrchestrator, StreamChunk};
use modelrelay::provider::{
    Completion, FinishReason, FragmentStream, GenerationClient, GenerationRequest, ProviderError,
};
use modelrelay::roster::ModelRoster;

struct AlwaysThrottled {
    attempts: AtomicUsize,
}

#[async_trait]
impl GenerationClient for AlwaysThrottled {
    async fn call_buffered(
        &self,
        _model: &str,
        _request: &GenerationRequest,
    ) -> Result<Completion, ProviderError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ProviderError::RateLimited {
            message: "quota exceeded".to_string(),
        })
    }

    async fn call_streaming(
        &self,
        _model: &str,
        _request: &GenerationRequest,
    ) -> Result<FragmentStream, ProviderError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ProviderError::Overloaded {
            message: "no capacity".to_string(),
        })
    }
}

/// Degenerate provider: always "succeeds" with an empty string.
struct AlwaysEmpty {
    attempts: AtomicUsize,
}

#[async_trait]
impl GenerationClient for AlwaysEmpty {
    async fn call_buffered(
        &self,
        _model: &str,
        _request: &GenerationRequest,
    ) -> Result<Completion, ProviderError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Ok(Completion {
            text: String::new(),
            finish_reason: FinishReason::NaturalStop,
        })
    }

    async fn call_streaming(
        &self,
        _model: &str,
        _request: &GenerationRequest,
    ) -> Result<FragmentStream, ProviderError> {
        Err(ProviderError::StreamClosed)
    }
}

fn orchestrator(client: Arc<dyn GenerationClient>, max_attempts: usize) -> RequestOrchestrator {
    let roster =
        ModelRoster::new("relay-pro", vec!["relay-flash".to_string()]).expect("valid roster");
    RequestOrchestrator::new(
        roster,
        BackoffPolicy::new(1),
        client,
        Arc::new(Metrics::new().expect("metrics")),
    )
    .with_max_attempts(max_attempts)
}

#[tokio::test]
async fn test_complete_exhaustion_names_every_model_tried() {
    let client = Arc::new(AlwaysThrottled {
        attempts: AtomicUsize::new(0),
    });
    let orchestrator = orchestrator(client.clone(), 3);

    let request = GenerationRequest::new("hello").expect("valid request");
    let result = tokio::time::timeout(Duration::from_secs(5), orchestrator.complete(&request))
        .await
        .expect("must terminate, not hang");

    let error = result.expect_err("all models fail");
    let OrchestratorError::RosterExhausted {
        models_tried,
        last_error,
    } = error;
    assert_eq!(models_tried, vec!["relay-pro", "relay-flash"]);
    assert!(matches!(last_error, ProviderError::RateLimited { .. }));
    // Every model got its full attempt budget.
    assert_eq!(client.attempts.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_empty_responses_behave_like_transient_exhaustion() {
    // An empty completion must behave exactly like a transient failure:
    // retried per model, never returned as success.
    let client = Arc::new(AlwaysEmpty {
        attempts: AtomicUsize::new(0),
    });
    let orchestrator = orchestrator(client.clone(), 3);

    let request = GenerationRequest::new("hello").expect("valid request");
    let result = orchestrator.complete(&request).await;

    let OrchestratorError::RosterExhausted { last_error, .. } =
        result.expect_err("empty text is never success");
    assert!(matches!(last_error, ProviderError::EmptyCompletion));
    assert_eq!(client.attempts.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_stream_exhaustion_emits_single_terminal_error() {
    let client = Arc::new(AlwaysThrottled {
        attempts: AtomicUsize::new(0),
    });
    let orchestrator = orchestrator(client.clone(), 3);

    let request = GenerationRequest::new("hello").expect("valid request");
    let chunks: Vec<StreamChunk> =
        tokio::time::timeout(Duration::from_secs(5), orchestrator.stream(request).collect())
            .await
            .expect("must terminate, not hang");

    assert_eq!(chunks.len(), 1, "exactly one terminal chunk: {chunks:?}");
    match &chunks[0] {
        StreamChunk::Error { message } => {
            assert!(message.contains("relay-pro"));
            assert!(message.contains("relay-flash"));
        }
        other => panic!("expected terminal Error chunk, got {other:?}"),
    }
    // Streaming mode does one attempt per model, no in-model retries.
    assert_eq!(client.attempts.load(Ordering::SeqCst), 2);
}
