//! Streaming completion handler
//!
//! Handles POST /api/stream: delivers the orchestrator's chunk sequence as
//! Server-Sent Events with named event types, a periodic keepalive, and
//! disconnect-driven cancellation.
//!
//! # SSE Format
//!
//! Events are named `token`, `meta`, `ping`, `error`, and `done`. Payloads
//! are JSON (newlines escaped by encoding, so line-oriented framing stays
//! valid) except for `done`, which carries the literal `[DONE]`.
//!
//! The keepalive is owned by the SSE response itself, so it stops on every
//! exit path — completion, error, and client disconnect alike. Dropping the
//! response drops the chunk stream, which aborts the orchestration worker
//! and any in-flight provider call.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    Extension, Json,
    extract::State,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::StreamExt;

use crate::error::AppError;
use crate::handlers::{AppState, GenerationParams};
use crate::middleware::RequestId;
use crate::orchestrator::StreamChunk;

/// POST /api/stream handler
pub async fn handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(params): Json<GenerationParams>,
) -> Result<Response, AppError> {
    tracing::debug!(
        request_id = %request_id,
        prompt_length = params.prompt.len(),
        "Received streaming completion request"
    );

    let request = params.resolve(state.config())?;
    let keepalive = Duration::from_secs(state.config().stream.keepalive_seconds());

    tracing::info!(
        request_id = %request_id,
        primary_model = %state.orchestrator().roster().primary(),
        "Starting streaming response"
    );

    let events = state
        .orchestrator()
        .stream(request)
        .map(|chunk| Ok::<Event, Infallible>(chunk_to_event(chunk)));

    Ok(Sse::new(events)
        .keep_alive(
            KeepAlive::new()
                .interval(keepalive)
                .event(Event::default().event("ping").data("{}")),
        )
        .into_response())
}

fn chunk_to_event(chunk: StreamChunk) -> Event {
    let (name, data) = chunk_wire_parts(chunk);
    Event::default().event(name).data(data)
}

/// Map a chunk to its wire event name and payload.
pub(crate) fn chunk_wire_parts(chunk: StreamChunk) -> (&'static str, String) {
    match chunk {
        StreamChunk::Text(text) => (
            "token",
            serde_json::json!({ "text": text }).to_string(),
        ),
        StreamChunk::Meta {
            model,
            finish_reason,
        } => (
            "meta",
            serde_json::json!({ "model": model, "finish_reason": finish_reason }).to_string(),
        ),
        StreamChunk::Error { message } => (
            "error",
            serde_json::json!({ "message": message }).to_string(),
        ),
        StreamChunk::Done => ("done", "[DONE]".to_string()),
    }
}
