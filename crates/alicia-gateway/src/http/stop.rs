use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// POST /stop/{conversation_id} — out-of-band emergency stop, for clients
/// that can't reach the live WS connection to send a `ControlStop` frame.
pub async fn stop_handler(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match alicia_engine::execute_stop(&state.engine, &conversation_id) {
        Ok(cancelled) => (StatusCode::OK, Json(json!({ "cancelled": cancelled }))),
        Err(e) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}
