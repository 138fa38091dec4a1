use async_trait::async_trait;

use vicw_core::types::Message;

/// Request to the completion endpoint. Messages carry the engine's internal
/// roles; the transport maps synthetic roles onto wire roles.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub text: String,
    pub model: String,
    pub latency_ms: u64,
    pub tokens_in: u32,
    pub tokens_out: u32,
}

/// Transport to an OpenAI-chat-completions-compatible endpoint.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Client name for logging and /health.
    fn name(&self) -> &str;

    async fn generate(&self, req: &CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("retries exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl LlmError {
    /// 4xx responses are the caller's fault and are never retried.
    pub fn is_permanent(&self) -> bool {
        matches!(self, LlmError::Api { status, .. } if (400..500).contains(status))
    }
}
