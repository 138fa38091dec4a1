use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use vicw_core::config::LlmConfig;
use vicw_core::types::{Message, Role};

use crate::provider::{CompletionRequest, CompletionResponse, LlmClient, LlmError};

/// Base delay for the exponential backoff between retries.
const BACKOFF_BASE_MS: u64 = 500;

pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    chat_path: String,
    retries: u32,
}

impl OpenAiClient {
    /// `base_url` without trailing slash; `chat_path` starting with "/".
    pub fn new(config: &LlmConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            chat_path: config.chat_path.clone(),
            retries: config.retries,
        }
    }

    async fn send_once(&self, body: &serde_json::Value) -> Result<CompletionResponse, LlmError> {
        let url = format!("{}{}", self.base_url, self.chat_path);
        let started = Instant::now();

        let mut request = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }
        let resp = request.send().await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "completion API error");
            return Err(LlmError::Api {
                status,
                message: text,
            });
        }

        let api_resp: ApiResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;
        Ok(parse_response(api_resp, started.elapsed().as_millis() as u64))
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn name(&self) -> &str {
        "openai-compat"
    }

    /// Connect errors and 5xx retry with exponential backoff; 4xx surfaces
    /// immediately.
    async fn generate(&self, req: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = build_request_body(req);
        debug!(model = %req.model, messages = req.messages.len(), "sending completion request");

        let mut last_error: Option<LlmError> = None;
        for attempt in 0..=self.retries {
            if attempt > 0 {
                let delay = BACKOFF_BASE_MS * (1u64 << (attempt - 1));
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            match self.send_once(&body).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_permanent() => return Err(e),
                Err(e) => {
                    warn!(attempt, error = %e, "completion attempt failed");
                    last_error = Some(e);
                }
            }
        }
        Err(LlmError::Exhausted {
            attempts: self.retries + 1,
            last: last_error.map(|e| e.to_string()).unwrap_or_default(),
        })
    }
}

pub(crate) fn build_request_body(req: &CompletionRequest) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = req
        .messages
        .iter()
        .map(|m| {
            serde_json::json!({
                "role": wire_role(m),
                "content": m.content,
            })
        })
        .collect();

    serde_json::json!({
        "model": req.model,
        "messages": messages,
        "temperature": req.temperature,
        "max_tokens": req.max_tokens,
        "stream": false,
    })
}

/// Synthetic roles ride as system messages; the endpoint only knows
/// system/user/assistant.
fn wire_role(message: &Message) -> &'static str {
    match message.role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System | Role::State | Role::Rag => "system",
    }
}

pub(crate) fn parse_response(resp: ApiResponse, latency_ms: u64) -> CompletionResponse {
    let text = resp
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default();

    CompletionResponse {
        text,
        model: resp.model,
        latency_ms,
        tokens_in: resp.usage.as_ref().map(|u| u.prompt_tokens).unwrap_or(0),
        tokens_out: resp
            .usage
            .as_ref()
            .map(|u| u.completion_tokens)
            .unwrap_or(0),
    }
}

#[derive(Deserialize)]
pub(crate) struct ApiResponse {
    pub(crate) model: String,
    pub(crate) choices: Vec<Choice>,
    pub(crate) usage: Option<Usage>,
}

#[derive(Deserialize)]
pub(crate) struct Choice {
    pub(crate) message: ChatMessage,
}

#[derive(Deserialize)]
pub(crate) struct ChatMessage {
    pub(crate) content: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct Usage {
    pub(crate) prompt_tokens: u32,
    pub(crate) completion_tokens: u32,
}
