//! Stateless metadata queries: server health and the supported modes.

use axum::Json;
use axum::extract::State;

use remoteme_core::protocol::{HealthResponse, ModesResponse};

use super::AppState;

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::healthy(
        state.config.port,
        &state.config.project_root,
    ))
}

/// `GET /modes`
pub async fn modes() -> Json<ModesResponse> {
    Json(ModesResponse::current())
}
