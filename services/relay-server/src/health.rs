// Health Endpoint: the single HTTP side channel spec §6 names. Reports how
// many sessions are currently live, as a cheap external liveness signal.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;
use crate::time::now_ms;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.registry.len().await;
    Json(json!({
        "ok": true,
        "sessions": sessions,
        "timestamp": now_ms(),
    }))
}
