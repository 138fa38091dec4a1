use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::app::AppState;

#[derive(Deserialize, Default)]
pub struct ResetRequest {
    #[serde(default)]
    pub session_id: Option<String>,
}

/// POST /reset — clear a session's live window and echo ring.
/// Persisted chunks, vectors, and states are untouched.
pub async fn reset_handler(
    State(state): State<Arc<AppState>>,
    body: Option<Json<ResetRequest>>,
) -> Json<Value> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let session_id = req.session_id.as_deref().unwrap_or("default");
    let session = state.session(session_id);

    let mut inner = session.lock().await;
    inner.context.reset();
    inner.ring.clear();
    info!(session = session_id, "session reset");

    Json(json!({ "status": "ok", "session_id": session_id }))
}
