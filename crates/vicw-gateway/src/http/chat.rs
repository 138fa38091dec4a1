//! Per-turn chat endpoint — POST /chat
//!
//! Request:  `{"message": "hello"}` (optional: `use_rag`, `session_id`)
//! Response: `{"response": "...", "timestamp": "...",
//!             "tokens_in_context": 0, "rag_items_injected": 0}`
//! Error:    `{"error": "...", "code": "..."}`
//!
//! Auth: `Authorization: Bearer <token>` header when `gateway.token` is set.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use vicw_agent::pipeline::process_turn;
use vicw_agent::provider::LlmError;

use crate::app::AppState;

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Retrieval on by default; `false` skips the vector/graph lookup.
    #[serde(default = "default_use_rag")]
    pub use_rag: bool,
    /// Defaults to `"default"` — one shared session per deployment unless
    /// the client namespaces itself.
    #[serde(default)]
    pub session_id: Option<String>,
}

fn default_use_rag() -> bool {
    true
}

#[derive(Serialize)]
pub struct ChatReply {
    pub response: String,
    pub timestamp: String,
    pub tokens_in_context: u32,
    pub rag_items_injected: usize,
}

#[derive(Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: &'static str,
}

pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatReply>, (StatusCode, Json<ApiError>)> {
    if !check_auth(&state, &headers) {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ApiError {
                error: "Unauthorized. Set 'Authorization: Bearer <token>'.".to_string(),
                code: "UNAUTHORIZED",
            }),
        ));
    }

    if req.message.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError {
                error: "message cannot be empty".to_string(),
                code: "EMPTY_MESSAGE",
            }),
        ));
    }

    let session_id = req.session_id.as_deref().unwrap_or("default");
    let session = state.session(session_id);

    match process_turn(state.as_ref(), &session, &req.message, req.use_rag).await {
        Ok(outcome) => Ok(Json(ChatReply {
            response: outcome.response,
            timestamp: chrono::Utc::now().to_rfc3339(),
            tokens_in_context: outcome.tokens_in_context,
            rag_items_injected: outcome.rag_items_injected,
        })),
        Err(e) => {
            warn!(error = %e, session = session_id, "POST /chat failed");
            Err(map_llm_error(e))
        }
    }
}

/// LLM transport failures surface as 502 with a machine-readable code;
/// everything else already degraded inside the pipeline.
pub(crate) fn map_llm_error(e: LlmError) -> (StatusCode, Json<ApiError>) {
    let code = match &e {
        LlmError::Api { .. } => "LLM_ERROR",
        LlmError::Parse(_) => "LLM_ERROR",
        LlmError::Http(_) | LlmError::Exhausted { .. } => "LLM_UNREACHABLE",
    };
    (
        StatusCode::BAD_GATEWAY,
        Json(ApiError {
            error: e.to_string(),
            code,
        }),
    )
}

/// Returns true if the request is authorised. No configured token means
/// the API is open (loopback deployments).
pub(crate) fn check_auth(state: &AppState, headers: &HeaderMap) -> bool {
    match &state.config.gateway.token {
        None => true,
        Some(expected) => extract_bearer(headers)
            .map(|t| t == expected)
            .unwrap_or(false),
    }
}

pub(crate) fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}
