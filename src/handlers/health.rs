//! Health check endpoint
//!
//! Provides a simple health check for monitoring and load balancers.

use axum::{Json, http::StatusCode};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: &'static str,
    /// Service name, for multi-service deployments
    pub service: &'static str,
    /// Unix timestamp of the response
    pub ts: u64,
}

/// Health check handler
///
/// Returns 200 OK whenever the process is serving requests.
pub async fn handler() -> (StatusCode, Json<HealthResponse>) {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            service: "modelrelay",
            ts,
        }),
    )
}
