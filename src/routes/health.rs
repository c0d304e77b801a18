//! GET /health

use axum::Json;
use axum::extract::State;
use std::sync::Arc;

use crate::session::SessionStore;
use crate::types::HealthResponse;

/// Health check — reports which store backend is active and whether it
/// answers a probe.
pub async fn health(State(state): State<Arc<crate::AppState>>) -> Json<HealthResponse> {
    let store = state.session_layer.manager.store();
    let store_status = match store.ping().await {
        Ok(()) => "ok",
        Err(e) => {
            tracing::warn!(error = %e, "session store probe failed");
            "unreachable"
        }
    };
    Json(HealthResponse {
        status: "ok",
        store: store.kind(),
        store_status,
    })
}
