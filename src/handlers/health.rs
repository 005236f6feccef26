//! Health and readiness endpoints.
//!
//! - **Health** (`/health`): Returns 200 even if degraded, includes details
//! - **Readiness** (`/ready`): Returns 503 while the log writer is disconnected

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::Utc;
use tracing::instrument;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "healthy",
///   "log_connected": true,
///   "version": "0.1.0",
///   "timestamp": "2024-01-15T10:30:00Z",
///   "uptime_seconds": 42,
///   "orders_accepted": 17
/// }
/// ```
#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let log_connected = state.log_connected();

    Json(HealthResponse {
        status: if log_connected { "healthy" } else { "degraded" }.to_string(),
        log_connected,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        uptime_seconds: state.uptime_seconds(),
        orders_accepted: state.orders.orders_accepted(),
    })
}

/// Readiness check endpoint for orchestrators such as Kubernetes.
#[instrument(skip(state))]
pub async fn readiness_check(State(state): State<AppState>) -> Result<StatusCode, StatusCode> {
    if state.log_connected() {
        Ok(StatusCode::OK)
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}
