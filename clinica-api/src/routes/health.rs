//! Health Check Endpoint
//!
//! No authentication required. Reports pool numbers and verifies that a
//! connection can actually run a query.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::state::AppState;
use crate::types::HealthResponse;

/// GET /health - Liveness plus database connectivity
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.db.status();

    let db_ok = match state.db.client().await {
        Ok(client) => client.simple_query("SELECT 1").await.is_ok(),
        Err(_) => false,
    };

    let response = HealthResponse {
        status: if db_ok { "ok" } else { "degraded" },
        pool_size: status.size,
        pool_available: status.available,
    };

    let code = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (code, Json(response))
}
