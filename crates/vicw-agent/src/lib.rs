pub mod embed_http;
pub mod openai;
pub mod pipeline;
pub mod provider;

pub use embed_http::HttpEmbedder;
pub use openai::OpenAiClient;
pub use provider::{CompletionRequest, CompletionResponse, LlmClient, LlmError};
