use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message role inside the live context window.
///
/// `State` and `Rag` are synthetic roles inserted during prompt assembly.
/// They are ephemeral — never shed into chunks and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    State,
    Rag,
}

impl Role {
    /// Synthetic roles are injected per prompt and excluded from offload.
    pub fn is_synthetic(&self) -> bool {
        matches!(self, Role::State | Role::Rag)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::State => write!(f, "state"),
            Role::Rag => write!(f, "rag"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "state" => Ok(Role::State),
            "rag" => Ok(Role::Rag),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// A single message in the live context window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub token_count: u32,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>, token_count: u32) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            token_count,
        }
    }
}

/// Globally unique identifier for an offloaded chunk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkId(pub String);

impl ChunkId {
    pub fn new() -> Self {
        Self(format!("chunk-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ChunkId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChunkId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Durable record of one offloaded chunk, as stored in the chunk store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_id: ChunkId,
    pub chunk_text: String,
    pub summary: String,
    /// Caller-supplied metadata. `None` for shed conversation; `/ingest`
    /// passes its request metadata through here.
    pub metadata: Option<serde_json::Value>,
    pub token_count: u32,
    pub message_count: u32,
    pub created_at: DateTime<Utc>,
}

/// Unit of work handed from the hot path to the cold-path worker.
///
/// Carries a copy of the shed messages so the live window can be mutated
/// freely while the job waits in the queue.
#[derive(Debug, Clone)]
pub struct OffloadJob {
    pub chunk_id: ChunkId,
    pub messages: Vec<Message>,
    pub pinned_header_snapshot: String,
    /// Carried verbatim into the chunk record.
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl OffloadJob {
    /// Render the job's messages as plain text, one `role: content` line pair
    /// per turn. This is the text the summarizer and state extractor see.
    pub fn full_text(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn token_count(&self) -> u32 {
        self.messages.iter().map(|m| m.token_count).sum()
    }
}

/// Emitted by the context manager when a shed fires.
#[derive(Debug, Clone, Serialize)]
pub struct OffloadEvent {
    pub chunk_id: ChunkId,
    pub tokens_before: u32,
    pub tokens_after: u32,
    pub duration_us: u64,
}

/// Kind of conversational state tracked out-of-band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateType {
    Goal,
    Task,
    Decision,
    Fact,
}

impl StateType {
    pub const ALL: [StateType; 4] = [
        StateType::Goal,
        StateType::Task,
        StateType::Decision,
        StateType::Fact,
    ];
}

impl fmt::Display for StateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateType::Goal => write!(f, "goal"),
            StateType::Task => write!(f, "task"),
            StateType::Decision => write!(f, "decision"),
            StateType::Fact => write!(f, "fact"),
        }
    }
}

impl std::str::FromStr for StateType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "goal" => Ok(StateType::Goal),
            "task" => Ok(StateType::Task),
            "decision" => Ok(StateType::Decision),
            "fact" => Ok(StateType::Fact),
            other => Err(format!("unknown state type: {other}")),
        }
    }
}

/// Lifecycle status of a state node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateStatus {
    Active,
    Completed,
    Invalid,
}

impl fmt::Display for StateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateStatus::Active => write!(f, "active"),
            StateStatus::Completed => write!(f, "completed"),
            StateStatus::Invalid => write!(f, "invalid"),
        }
    }
}

impl std::str::FromStr for StateStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(StateStatus::Active),
            "completed" => Ok(StateStatus::Completed),
            "invalid" => Ok(StateStatus::Invalid),
            other => Err(format!("unknown state status: {other}")),
        }
    }
}

/// A goal/task/decision/fact node as stored in the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateNode {
    pub state_id: String,
    pub state_type: StateType,
    pub description: String,
    pub status: StateStatus,
    pub visit_count: u32,
    pub last_visited: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Candidate emitted by the state extractor, before fuzzy upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateCandidate {
    pub state_type: StateType,
    pub status: StateStatus,
    pub description: String,
}

/// One semantic retrieval hit: a chunk summary with its similarity score.
#[derive(Debug, Clone, Serialize)]
pub struct SemanticHit {
    pub chunk_id: ChunkId,
    pub summary: String,
    pub score: f32,
}

/// Combined result of vector + graph retrieval for one query.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RagResult {
    pub semantic: Vec<SemanticHit>,
    pub relational: Vec<String>,
}

impl RagResult {
    pub fn is_empty(&self) -> bool {
        self.semantic.is_empty() && self.relational.is_empty()
    }

    pub fn items(&self) -> usize {
        self.semantic.len() + self.relational.len()
    }
}
