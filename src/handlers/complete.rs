//! Buffered completion handler
//!
//! Handles POST /api/complete: one prompt in, one full answer out, with
//! retry and fallback hidden behind the orchestrator.

use axum::{Extension, Json, extract::State};
use serde::Serialize;

use crate::error::AppResult;
use crate::handlers::{AppState, GenerationParams};
use crate::middleware::RequestId;

/// Buffered completion response
#[derive(Debug, Serialize)]
pub struct CompleteResponse {
    /// The full generated text.
    pub text: String,
    /// The model that ultimately served the request.
    pub model: String,
}

/// POST /api/complete handler
pub async fn handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(params): Json<GenerationParams>,
) -> AppResult<Json<CompleteResponse>> {
    tracing::debug!(
        request_id = %request_id,
        prompt_length = params.prompt.len(),
        "Received buffered completion request"
    );

    let request = params.resolve(state.config())?;
    let outcome = state.orchestrator().complete(&request).await?;

    tracing::info!(
        request_id = %request_id,
        model = %outcome.model_used,
        response_length = outcome.text.len(),
        "Buffered completion served"
    );

    Ok(Json(CompleteResponse {
        text: outcome.text,
        model: outcome.model_used,
    }))
}
