use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health — liveness probe.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "protocol_version": alicia_core::config::PROTOCOL_VERSION,
        "active_turns": state.engine.active_turns.len(),
    }))
}
