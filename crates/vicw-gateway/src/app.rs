use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use dashmap::DashMap;

use vicw_agent::pipeline::{EchoGuard, Session, TurnContext};
use vicw_agent::provider::LlmClient;
use vicw_context::latch::PauseLatch;
use vicw_context::queue::OffloadQueue;
use vicw_core::config::VicwConfig;
use vicw_memory::traits::{ChunkStore, Embedder, GraphStore, VectorIndex};
use vicw_semantic::retrieval::RetrievalCoordinator;
use vicw_semantic::state::StateMachine;
use vicw_semantic::worker::WorkerMetrics;

/// Central shared state — passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: VicwConfig,
    pub llm: Arc<dyn LlmClient>,
    pub chunks: Arc<dyn ChunkStore>,
    pub queue: Arc<OffloadQueue>,
    pub latch: PauseLatch,
    pub worker_metrics: WorkerMetrics,
    retrieval: RetrievalCoordinator,
    states: StateMachine,
    echo: EchoGuard,
    /// Live sessions: session_id -> hot-path state behind its own mutex.
    sessions: DashMap<String, Arc<Session>>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: VicwConfig,
        llm: Arc<dyn LlmClient>,
        embedder: Arc<dyn Embedder>,
        chunks: Arc<dyn ChunkStore>,
        vectors: Arc<dyn VectorIndex>,
        graph: Arc<dyn GraphStore>,
        queue: Arc<OffloadQueue>,
        latch: PauseLatch,
        worker_metrics: WorkerMetrics,
    ) -> Self {
        let retrieval = RetrievalCoordinator::new(
            embedder.clone(),
            vectors,
            chunks.clone(),
            graph.clone(),
            config.retrieval.clone(),
        );
        let states = StateMachine::new(graph);
        let echo = EchoGuard::new(config.echo.clone(), embedder);
        Self {
            config,
            llm,
            chunks,
            queue,
            latch,
            worker_metrics,
            retrieval,
            states,
            echo,
            sessions: DashMap::new(),
        }
    }

    /// Fetch or lazily create a session. Unknown ids spin up a fresh
    /// context window; persistent stores are shared across sessions.
    pub fn session(&self, session_id: &str) -> Arc<Session> {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Session::new(&self.config, self.queue.clone())))
            .clone()
    }

    pub fn echo_guard(&self) -> &EchoGuard {
        &self.echo
    }
}

impl TurnContext for AppState {
    fn config(&self) -> &VicwConfig {
        &self.config
    }

    fn llm(&self) -> &dyn LlmClient {
        self.llm.as_ref()
    }

    fn retrieval(&self) -> &RetrievalCoordinator {
        &self.retrieval
    }

    fn states(&self) -> &StateMachine {
        &self.states
    }

    fn echo(&self) -> &EchoGuard {
        &self.echo
    }

    fn latch(&self) -> &PauseLatch {
        &self.latch
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/chat", post(crate::http::chat::chat_handler))
        .route("/health", get(crate::http::health::health_handler))
        .route("/stats", get(crate::http::stats::stats_handler))
        .route("/reset", post(crate::http::reset::reset_handler))
        .route("/ingest", post(crate::http::ingest::ingest_handler))
        .route("/v1/models", get(crate::http::openai_compat::list_models))
        .route(
            "/v1/chat/completions",
            post(crate::http::openai_compat::chat_completions),
        )
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
