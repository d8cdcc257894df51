//! Health Handler

use axum::extract::State;
use axum::Json;
use std::sync::Arc;

use crate::models::HealthResponse;
use crate::AppState;

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        agent_initialized: true,
        voice_initialized: state.voice.is_some(),
    })
}
