//! Health and presence endpoints.

use axum::{extract::State, Json};
use serde_json::{json, Value};
use taskpulse_core::presence::SessionId;

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "sessions": state.hub.session_count(),
        "tasks": state.hub.store().len(),
        "stream_subscribers": state.ticker.subscriber_count(),
    }))
}

/// Ids of all connected WebSocket sessions.
pub async fn presence(State(state): State<AppState>) -> Json<Vec<SessionId>> {
    Json(state.hub.online_users())
}
