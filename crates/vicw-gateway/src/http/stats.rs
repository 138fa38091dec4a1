use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

#[derive(Deserialize)]
pub struct StatsQuery {
    #[serde(default)]
    pub session_id: Option<String>,
}

/// GET /stats — context, queue, and worker counters in one snapshot.
pub async fn stats_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Json<Value> {
    let session_id = query.session_id.as_deref().unwrap_or("default");
    let session = state.session(session_id);
    let context = {
        let inner = session.lock().await;
        inner.context.stats()
    };
    let queue = state.queue.stats();
    let worker = state.worker_metrics.snapshot();

    Json(json!({
        "context": context,
        "queue": queue,
        "worker": worker,
        "echo_guard_exhausted": state.echo_guard().exhausted_count(),
        "chunks_persisted": state.chunks.count().unwrap_or(0),
    }))
}
