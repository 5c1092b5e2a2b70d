//! Continuation driving for streaming generations
//!
//! One controller instance drives one model for the lifetime of one stream
//! call. While the provider keeps reporting length-capped finishes, the
//! controller re-prompts it to continue from the trailing context and
//! stitches the fragments into a single logical output stream.
//!
//! The loop is deliberately unbounded: a length cap is a provider limit,
//! not a content boundary, so the only exits are a natural stop, a provider
//! failure, or caller cancellation. The explicit turn counter makes adding
//! a safety cap a deliberate one-line change.

use futures::StreamExt;
use tokio::sync::mpsc;

use crate::metrics::Metrics;
use crate::orchestrator::StreamChunk;
use crate::orchestrator::dedupe::{TrailingWindow, strip_overlap};
use crate::provider::{
    FinishReason, Fragment, GenerationClient, GenerationRequest, ProviderError,
};

/// Controller states for one stream call against one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Requesting,
    Emitting,
    ContinuePending,
    Finished,
    Failed,
}

/// How a controller run ended, from the orchestrator's point of view.
#[derive(Debug)]
pub(crate) enum ControllerOutcome {
    /// Natural stop; `Meta` and `Done` chunks were already delivered.
    Finished,
    /// Provider failure: abandon this model and move to the next one.
    /// `emitted_text` records whether the caller already received output
    /// from this model (delivered text is never retracted).
    Failed {
        error: ProviderError,
        emitted_text: bool,
    },
    /// The caller stopped consuming; tear down without another chunk.
    Cancelled,
}

pub(crate) struct ContinuationController<'a> {
    client: &'a dyn GenerationClient,
    metrics: &'a Metrics,
    model: &'a str,
    tail_chars: usize,
}

impl<'a> ContinuationController<'a> {
    pub(crate) fn new(
        client: &'a dyn GenerationClient,
        metrics: &'a Metrics,
        model: &'a str,
        tail_chars: usize,
    ) -> Self {
        Self {
            client,
            metrics,
            model,
            tail_chars,
        }
    }

    /// Drive the model until natural stop, failure, or cancellation,
    /// sending deduplicated chunks into `tx`.
    pub(crate) async fn run(
        &self,
        request: &GenerationRequest,
        tx: &mpsc::Sender<StreamChunk>,
    ) -> ControllerOutcome {
        let mut phase = Phase::Requesting;
        let mut window = TrailingWindow::new(self.tail_chars);
        let mut turn: usize = 0;
        let mut emitted_text = false;

        loop {
            let attempt = if turn == 0 {
                request.clone()
            } else {
                request.with_prompt(continuation_prompt(window.as_str()))
            };

            let mut fragments = match self.client.call_streaming(self.model, &attempt).await {
                Ok(stream) => stream,
                Err(error) => {
                    self.transition(&mut phase, Phase::Failed);
                    tracing::warn!(
                        model = %self.model,
                        turn = turn,
                        error = %error,
                        "Streaming call failed to start"
                    );
                    return ControllerOutcome::Failed {
                        error,
                        emitted_text,
                    };
                }
            };

            self.transition(&mut phase, Phase::Emitting);
            let mut finish: Option<FinishReason> = None;

            while let Some(item) = fragments.next().await {
                match item {
                    Ok(Fragment::Text(text)) => {
                        let residual = strip_overlap(&text, &window);
                        if residual.is_empty() {
                            continue;
                        }
                        if tx
                            .send(StreamChunk::Text(residual.to_string()))
                            .await
                            .is_err()
                        {
                            return ControllerOutcome::Cancelled;
                        }
                        window.push(residual);
                        emitted_text = true;
                    }
                    Ok(Fragment::Finished(reason)) => {
                        finish = Some(reason);
                        break;
                    }
                    Err(error) => {
                        self.transition(&mut phase, Phase::Failed);
                        tracing::warn!(
                            model = %self.model,
                            turn = turn,
                            error = %error,
                            "Stream failed mid-generation"
                        );
                        return ControllerOutcome::Failed {
                            error,
                            emitted_text,
                        };
                    }
                }
            }

            match finish {
                Some(FinishReason::NaturalStop) => {
                    self.transition(&mut phase, Phase::Finished);
                    let meta = StreamChunk::Meta {
                        model: self.model.to_string(),
                        finish_reason: FinishReason::NaturalStop,
                    };
                    if tx.send(meta).await.is_err() || tx.send(StreamChunk::Done).await.is_err() {
                        return ControllerOutcome::Cancelled;
                    }
                    tracing::info!(
                        model = %self.model,
                        continuation_turns = turn,
                        "Stream completed with natural stop"
                    );
                    return ControllerOutcome::Finished;
                }
                Some(FinishReason::LengthCapped) => {
                    self.transition(&mut phase, Phase::ContinuePending);
                    let meta = StreamChunk::Meta {
                        model: self.model.to_string(),
                        finish_reason: FinishReason::LengthCapped,
                    };
                    if tx.send(meta).await.is_err() {
                        return ControllerOutcome::Cancelled;
                    }
                    turn += 1;
                    self.metrics.record_continuation();
                    tracing::debug!(
                        model = %self.model,
                        turn = turn,
                        tail_length = window.as_str().len(),
                        "Generation length-capped, requesting continuation"
                    );
                    self.transition(&mut phase, Phase::Requesting);
                }
                None => {
                    self.transition(&mut phase, Phase::Failed);
                    return ControllerOutcome::Failed {
                        error: ProviderError::StreamClosed,
                        emitted_text,
                    };
                }
            }
        }
    }

    fn transition(&self, phase: &mut Phase, next: Phase) {
        tracing::trace!(
            model = %self.model,
            from = ?phase,
            to = ?next,
            "Continuation phase transition"
        );
        *phase = next;
    }
}

/// Prompt a continuation from the trailing context without resending the
/// full output produced so far.
fn continuation_prompt(tail: &str) -> String {
    format!(
        "Continue exactly where you left off. Do not repeat text you have \
         already produced. The tail of what you produced so far is:\n{tail}"
    )
}
