//! Prometheus metrics endpoint

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};

use crate::error::AppResult;
use crate::handlers::AppState;

/// GET /metrics handler
///
/// Renders the process registry in Prometheus text exposition format.
pub async fn handler(State(state): State<AppState>) -> AppResult<Response> {
    let body = state.metrics().render()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}
