//! Document ingestion — POST /ingest
//!
//! Wraps the document in a synthetic offload job and puts it straight on
//! the queue; the cold worker summarizes, embeds, and persists it exactly
//! like shed conversation. The live context window is never involved.

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use vicw_context::tokens::estimate_tokens;
use vicw_core::types::{ChunkId, Message, OffloadJob, Role};

use crate::app::AppState;
use crate::http::chat::ApiError;

#[derive(Deserialize)]
pub struct IngestRequest {
    pub document: String,
    #[serde(default)]
    pub metadata: Option<Value>,
}

pub async fn ingest_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IngestRequest>,
) -> Result<Json<Value>, (StatusCode, Json<ApiError>)> {
    if req.document.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError {
                error: "document cannot be empty".to_string(),
                code: "EMPTY_DOCUMENT",
            }),
        ));
    }

    let chunk_id = ChunkId::new();
    let tokens = estimate_tokens(&req.document);
    // Metadata rides the job into the chunk record the worker persists.
    let job = OffloadJob {
        chunk_id: chunk_id.clone(),
        messages: vec![Message::new(Role::User, req.document, tokens)],
        pinned_header_snapshot: String::new(),
        metadata: req.metadata.clone(),
        created_at: Utc::now(),
    };

    if !state.queue.enqueue(job) {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError {
                error: "offload queue full, retry later".to_string(),
                code: "QUEUE_FULL",
            }),
        ));
    }

    info!(chunk_id = %chunk_id, tokens, "document ingested");
    Ok(Json(json!({
        "status": "queued",
        "chunk_id": chunk_id,
        "token_count": tokens,
        "metadata": req.metadata,
    })))
}
