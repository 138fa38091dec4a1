use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Token cost charged for the `[ARCHIVED mem_id:…]` placeholder a shed
/// leaves behind. Small and constant so repeated sheds converge.
pub const PLACEHOLDER_TOKENS: u32 = 10;

/// Top-level config (vicw.toml + VICW_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VicwConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub echo: EchoConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Optional static bearer token. `None` leaves the API open
    /// (bind to loopback in that case).
    pub token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    /// Path appended to base_url for chat completions.
    #[serde(default = "default_chat_path")]
    pub chat_path: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Whole-request timeout in seconds.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    /// Retries on connect errors and 5xx. 4xx never retries.
    #[serde(default = "default_llm_retries")]
    pub retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            chat_path: default_chat_path(),
            api_key: String::new(),
            model: default_model(),
            max_tokens: default_llm_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout(),
            retries: default_llm_retries(),
        }
    }
}

/// Which embedding backend produces vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Deterministic local feature-hashing embedder. No network, no model.
    #[default]
    Hashed,
    /// OpenAI-compatible /v1/embeddings endpoint.
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,
    /// Embedding dimension. Pinned at startup; every write and query is
    /// checked against it — mixed-dimension points are refused.
    #[serde(default = "default_embedding_dim")]
    pub dim: usize,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_embed_path")]
    pub path: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_embed_model")]
    pub model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Hashed,
            dim: default_embedding_dim(),
            base_url: default_llm_base_url(),
            path: default_embed_path(),
            api_key: String::new(),
            model: default_embed_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Hard budget for the assembled prompt (T_max).
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Shed fires at `current/max >= trigger_ratio` (suppression clear).
    #[serde(default = "default_trigger_ratio")]
    pub trigger_ratio: f64,
    /// Shed removes oldest messages until `current/max <= target_ratio`.
    #[serde(default = "default_target_ratio")]
    pub target_ratio: f64,
    /// Suppression clears once `current/max <= resume_ratio`.
    #[serde(default = "default_resume_ratio")]
    pub resume_ratio: f64,
    /// Prepended verbatim to every prompt; never shed, never truncated.
    #[serde(default = "default_pinned_header")]
    pub pinned_header: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            trigger_ratio: default_trigger_ratio(),
            target_ratio: default_target_ratio(),
            resume_ratio: default_resume_ratio(),
            pinned_header: default_pinned_header(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Jobs beyond this are dropped, never blocked on.
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Sleep between empty queue polls, in milliseconds.
    #[serde(default = "default_idle_ms")]
    pub idle_ms: u64,
    #[serde(default = "default_lead_sentences")]
    pub lead_sentences: usize,
    #[serde(default = "default_tail_sentences")]
    pub tail_sentences: usize,
    #[serde(default = "default_summary_max_tokens")]
    pub summary_max_tokens: u32,
    /// Jobs drained per cycle.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            idle_ms: default_idle_ms(),
            lead_sentences: default_lead_sentences(),
            tail_sentences: default_tail_sentences(),
            summary_max_tokens: default_summary_max_tokens(),
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_top_k_semantic")]
    pub top_k_semantic: usize,
    #[serde(default = "default_top_k_relational")]
    pub top_k_relational: usize,
    /// Cosine similarity floor for semantic hits.
    #[serde(default = "default_min_score")]
    pub min_score: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            top_k_semantic: default_top_k_semantic(),
            top_k_relational: default_top_k_relational(),
            min_score: default_min_score(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_max_goals")]
    pub max_goals: usize,
    #[serde(default = "default_max_tasks")]
    pub max_tasks: usize,
    #[serde(default = "default_max_decisions")]
    pub max_decisions: usize,
    #[serde(default = "default_max_facts")]
    pub max_facts: usize,
    /// Recently completed states shown as "already done" reminders.
    #[serde(default = "default_completed_shown")]
    pub completed_shown: usize,
    #[serde(default = "bool_true")]
    pub boredom_enabled: bool,
    /// Visit count at which the loop warning fires.
    #[serde(default = "default_boredom_threshold")]
    pub boredom_threshold: u32,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_goals: default_max_goals(),
            max_tasks: default_max_tasks(),
            max_decisions: default_max_decisions(),
            max_facts: default_max_facts(),
            completed_shown: default_completed_shown(),
            boredom_enabled: true,
            boredom_threshold: default_boredom_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EchoConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// Ring size of recent assistant responses compared against.
    #[serde(default = "default_echo_history")]
    pub history: usize,
    /// Cosine similarity at or above which a response is an echo.
    #[serde(default = "default_echo_threshold")]
    pub threshold: f32,
    /// Regeneration attempts before accepting best-effort.
    #[serde(default = "default_echo_retries")]
    pub max_retries: u32,
    /// Strip RAG and state injections on the final retry.
    #[serde(default = "bool_true")]
    pub strip_on_final: bool,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            history: default_echo_history(),
            threshold: default_echo_threshold(),
            max_retries: default_echo_retries(),
            strip_on_final: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_port() -> u16 {
    8087
}
fn default_bind() -> String {
    "127.0.0.1".to_string()
}
fn default_llm_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_chat_path() -> String {
    "/v1/chat/completions".to_string()
}
fn default_model() -> String {
    "llama3.1".to_string()
}
fn default_llm_max_tokens() -> u32 {
    1024
}
fn default_temperature() -> f32 {
    0.7
}
fn default_llm_timeout() -> u64 {
    60
}
fn default_llm_retries() -> u32 {
    2
}
fn default_embedding_dim() -> usize {
    384
}
fn default_embed_path() -> String {
    "/v1/embeddings".to_string()
}
fn default_embed_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_max_tokens() -> u32 {
    8192
}
fn default_trigger_ratio() -> f64 {
    0.80
}
fn default_target_ratio() -> f64 {
    0.60
}
fn default_resume_ratio() -> f64 {
    0.70
}
fn default_pinned_header() -> String {
    "You are a helpful assistant with long-term memory. \
     Archived context may be restored under [CONTEXT FROM MEMORY]."
        .to_string()
}
fn default_queue_capacity() -> usize {
    100
}
fn default_idle_ms() -> u64 {
    100
}
fn default_lead_sentences() -> usize {
    2
}
fn default_tail_sentences() -> usize {
    1
}
fn default_summary_max_tokens() -> u32 {
    256
}
fn default_batch_size() -> usize {
    8
}
fn default_top_k_semantic() -> usize {
    2
}
fn default_top_k_relational() -> usize {
    5
}
fn default_min_score() -> f32 {
    0.4
}
fn default_max_goals() -> usize {
    2
}
fn default_max_tasks() -> usize {
    3
}
fn default_max_decisions() -> usize {
    2
}
fn default_max_facts() -> usize {
    3
}
fn default_completed_shown() -> usize {
    3
}
fn default_boredom_threshold() -> u32 {
    5
}
fn default_echo_history() -> usize {
    10
}
fn default_echo_threshold() -> f32 {
    0.95
}
fn default_echo_retries() -> u32 {
    3
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.vicw/vicw.db", home)
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.vicw/vicw.toml", home)
}

impl VicwConfig {
    /// Load config from a TOML file with VICW_* env var overrides.
    ///
    /// Checks in order: explicit path argument, then ~/.vicw/vicw.toml.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: VicwConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("VICW_").split("_"))
            .extract()
            .map_err(|e| crate::error::VicwError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject threshold orderings that would break hysteresis.
    pub fn validate(&self) -> crate::error::Result<()> {
        let c = &self.context;
        if !(c.target_ratio < c.resume_ratio
            && c.resume_ratio < c.trigger_ratio
            && c.trigger_ratio <= 1.0)
        {
            return Err(crate::error::VicwError::Config(format!(
                "context ratios must satisfy target < resume < trigger <= 1.0 \
                 (got target={} resume={} trigger={})",
                c.target_ratio, c.resume_ratio, c.trigger_ratio
            )));
        }
        if self.embedding.dim == 0 {
            return Err(crate::error::VicwError::Config(
                "embedding.dim must be positive".to_string(),
            ));
        }
        if self.context.max_tokens == 0 {
            return Err(crate::error::VicwError::Config(
                "context.max_tokens must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
