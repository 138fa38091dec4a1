//! OpenAI-compatible shim: GET /v1/models and POST /v1/chat/completions.
//!
//! Adapter around the same turn pipeline as /chat, so existing OpenAI
//! clients can point at the gateway unchanged. Streaming responses are
//! synthetic: the complete reply is cut into SSE chunks after generation.

use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use vicw_agent::pipeline::process_turn;

use crate::app::AppState;

/// Characters per synthetic streaming chunk.
const STREAM_CHUNK_CHARS: usize = 48;

/// GET /v1/models — single-entry list with the configured model.
pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "object": "list",
        "data": [{
            "id": state.config.llm.model,
            "object": "model",
            "owned_by": "vicw",
        }],
    }))
}

/// POST /v1/chat/completions.
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OpenAiRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<OpenAiError>)> {
    let user_message = req.last_user_message().ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            Json(OpenAiError::new("no user message found")),
        )
    })?;

    info!(model = %req.model, stream = req.stream, "OpenAI compat request");

    let session = state.session("openai");
    let outcome = match process_turn(state.as_ref(), &session, &user_message, true).await {
        Ok(o) => o,
        Err(e) => {
            warn!(error = %e, "chat completions failed");
            return Err((
                StatusCode::BAD_GATEWAY,
                Json(OpenAiError::new(&e.to_string())),
            ));
        }
    };

    if req.stream {
        Ok(stream_reply(outcome.response, outcome.model).into_response())
    } else {
        let reply = OpenAiResponse {
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4()),
            object: "chat.completion".to_string(),
            model: outcome.model,
            choices: vec![Choice {
                index: 0,
                message: Some(OpenAiMessage {
                    role: "assistant".to_string(),
                    content: Some(outcome.response),
                }),
                delta: None,
                finish_reason: Some("stop".to_string()),
            }],
            usage: Some(Usage {
                prompt_tokens: outcome.tokens_in_context,
                completion_tokens: 0,
                total_tokens: outcome.tokens_in_context,
            }),
        };
        Ok((StatusCode::OK, Json(reply)).into_response())
    }
}

/// Cut the complete reply into SSE chunks on char boundaries.
fn stream_reply(
    text: String,
    model: String,
) -> Sse<impl futures_util::Stream<Item = Result<Event, std::convert::Infallible>>> {
    let id = format!("chatcmpl-{}", uuid::Uuid::new_v4());

    let stream = async_stream::stream! {
        let chars: Vec<char> = text.chars().collect();
        for piece in chars.chunks(STREAM_CHUNK_CHARS) {
            let chunk = OpenAiResponse {
                id: id.clone(),
                object: "chat.completion.chunk".to_string(),
                model: model.clone(),
                choices: vec![Choice {
                    index: 0,
                    message: None,
                    delta: Some(OpenAiMessage {
                        role: "assistant".to_string(),
                        content: Some(piece.iter().collect()),
                    }),
                    finish_reason: None,
                }],
                usage: None,
            };
            let json = serde_json::to_string(&chunk).unwrap_or_default();
            yield Ok(Event::default().data(json));
        }

        let done = OpenAiResponse {
            id: id.clone(),
            object: "chat.completion.chunk".to_string(),
            model: model.clone(),
            choices: vec![Choice {
                index: 0,
                message: None,
                delta: Some(OpenAiMessage {
                    role: "assistant".to_string(),
                    content: None,
                }),
                finish_reason: Some("stop".to_string()),
            }],
            usage: None,
        };
        let json = serde_json::to_string(&done).unwrap_or_default();
        yield Ok(Event::default().data(json));
        yield Ok(Event::default().data("[DONE]"));
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

// ── OpenAI API types ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[allow(dead_code)]
pub struct OpenAiRequest {
    pub model: String,
    pub messages: Vec<OpenAiMessage>,
    #[serde(default)]
    pub stream: bool,
}

impl OpenAiRequest {
    fn last_user_message(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .and_then(|m| m.content.clone())
    }
}

#[derive(Serialize, Deserialize, Clone)]
pub struct OpenAiMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Serialize)]
struct OpenAiResponse {
    id: String,
    object: String,
    model: String,
    choices: Vec<Choice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<Usage>,
}

#[derive(Serialize)]
struct Choice {
    index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    delta: Option<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    finish_reason: Option<String>,
}

#[derive(Serialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Serialize)]
pub struct OpenAiError {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    #[serde(rename = "type")]
    error_type: String,
}

impl OpenAiError {
    fn new(msg: &str) -> Self {
        Self {
            error: ErrorBody {
                message: msg.to_string(),
                error_type: "invalid_request_error".to_string(),
            },
        }
    }
}
