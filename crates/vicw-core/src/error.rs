use thiserror::Error;

#[derive(Debug, Error)]
pub enum VicwError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM error ({status}): {message}")]
    Llm { status: u16, message: String },

    #[error("LLM unreachable: {0}")]
    LlmUnreachable(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Offload queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl VicwError {
    /// Short error code string included in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            VicwError::Config(_) => "CONFIG_ERROR",
            VicwError::Llm { .. } => "LLM_ERROR",
            VicwError::LlmUnreachable(_) => "LLM_UNREACHABLE",
            VicwError::Storage(_) => "STORAGE_ERROR",
            VicwError::Embedding(_) => "EMBEDDING_ERROR",
            VicwError::QueueFull { .. } => "QUEUE_FULL",
            VicwError::Serialization(_) => "SERIALIZATION_ERROR",
            VicwError::Io(_) => "IO_ERROR",
            VicwError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, VicwError>;
