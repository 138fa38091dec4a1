//! End-to-end turn flow through the HTTP surface, with a scripted LLM and
//! in-memory backends.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use rusqlite::Connection;
use tokio::sync::watch;
use tower::ServiceExt;

use vicw_agent::provider::{CompletionRequest, CompletionResponse, LlmClient, LlmError};
use vicw_context::latch::PauseLatch;
use vicw_context::queue::OffloadQueue;
use vicw_core::config::VicwConfig;
use vicw_gateway::app::{build_router, AppState};
use vicw_memory::chunk_store::SqliteChunkStore;
use vicw_memory::db::init_db;
use vicw_memory::embed::HashedEmbedder;
use vicw_memory::error::StoreError;
use vicw_memory::graph::SqliteGraphStore;
use vicw_memory::traits::{
    ChunkStore, Embedder, GraphStore, PointPayload, ScoredPoint, VectorIndex,
};
use vicw_memory::vector::InMemoryVectorIndex;
use vicw_semantic::manager::SemanticManager;
use vicw_semantic::worker::ColdWorker;

struct ScriptedLlm {
    script: Mutex<VecDeque<String>>,
    last: Mutex<String>,
}

impl ScriptedLlm {
    fn new(responses: &[&str]) -> Self {
        Self {
            script: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
            last: Mutex::new("scripted fallback".to_string()),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, _req: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let text = match self.script.lock().unwrap().pop_front() {
            Some(t) => {
                *self.last.lock().unwrap() = t.clone();
                t
            }
            None => self.last.lock().unwrap().clone(),
        };
        Ok(CompletionResponse {
            text,
            model: "scripted-model".to_string(),
            latency_ms: 1,
            tokens_in: 10,
            tokens_out: 10,
        })
    }
}

/// Vector index that fails every call — the "index unreachable" scenario.
struct DownVectorIndex;

impl VectorIndex for DownVectorIndex {
    fn upsert(&self, _id: &str, _v: &[f32], _p: PointPayload) -> Result<(), StoreError> {
        Err(StoreError::Database(rusqlite::Error::InvalidQuery))
    }
    fn search(&self, _v: &[f32], _k: usize, _min: f32) -> Result<Vec<ScoredPoint>, StoreError> {
        Err(StoreError::Database(rusqlite::Error::InvalidQuery))
    }
    fn len(&self) -> usize {
        0
    }
}

struct Harness {
    router: Router,
    state: Arc<AppState>,
}

fn harness_with(
    config: VicwConfig,
    llm: Arc<dyn LlmClient>,
    vectors: Arc<dyn VectorIndex>,
) -> Harness {
    let chunk_conn = Connection::open_in_memory().unwrap();
    init_db(&chunk_conn).unwrap();
    let graph_conn = Connection::open_in_memory().unwrap();
    init_db(&graph_conn).unwrap();

    let chunks: Arc<dyn ChunkStore> = Arc::new(SqliteChunkStore::new(chunk_conn));
    let graph: Arc<dyn GraphStore> = Arc::new(SqliteGraphStore::new(graph_conn));
    let embedder: Arc<dyn Embedder> = Arc::new(HashedEmbedder::new(config.embedding.dim));
    let queue = Arc::new(OffloadQueue::new(config.queue.capacity));
    let latch = PauseLatch::new();

    let state = Arc::new(AppState::new(
        config,
        llm,
        embedder,
        chunks,
        vectors,
        graph,
        queue,
        latch,
        Default::default(),
    ));
    Harness {
        router: build_router(state.clone()),
        state,
    }
}

fn harness(config: VicwConfig) -> Harness {
    let dim = config.embedding.dim;
    harness_with(
        config,
        Arc::new(ScriptedLlm::new(&["the scripted answer"])),
        Arc::new(InMemoryVectorIndex::new(dim)),
    )
}

async fn post_json(router: &Router, path: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let response = router
        .clone()
        .oneshot(
            Request::post(path)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, value)
}

async fn get_json(router: &Router, path: &str) -> (StatusCode, serde_json::Value) {
    let response = router
        .clone()
        .oneshot(Request::get(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, value)
}

#[tokio::test]
async fn chat_round_trip() {
    let h = harness(VicwConfig::default());
    let (status, body) = post_json(
        &h.router,
        "/chat",
        serde_json::json!({ "message": "hello there" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "the scripted answer");
    assert!(body["tokens_in_context"].as_u64().unwrap() > 0);
    assert_eq!(body["rag_items_injected"], 0);
}

#[tokio::test]
async fn empty_message_is_rejected() {
    let h = harness(VicwConfig::default());
    let (status, body) =
        post_json(&h.router, "/chat", serde_json::json!({ "message": "   " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "EMPTY_MESSAGE");
}

#[tokio::test]
async fn bearer_auth_enforced_when_configured() {
    let mut config = VicwConfig::default();
    config.gateway.token = Some("sekrit".to_string());
    let h = harness(config);

    let (status, _) = post_json(&h.router, "/chat", serde_json::json!({ "message": "hi" })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let response = h
        .router
        .clone()
        .oneshot(
            Request::post("/chat")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, "Bearer sekrit")
                .body(Body::from(
                    serde_json::json!({ "message": "hi" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn vector_index_down_degrades_gracefully() {
    // A /chat call with use_rag=true must still succeed with zero
    // injected items when the index is unreachable.
    let config = VicwConfig::default();
    let h = harness_with(
        config,
        Arc::new(ScriptedLlm::new(&["still fine"])),
        Arc::new(DownVectorIndex),
    );

    let (status, body) = post_json(
        &h.router,
        "/chat",
        serde_json::json!({ "message": "what did we discuss?", "use_rag": true }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "still fine");
    assert_eq!(body["rag_items_injected"], 0);
}

#[tokio::test]
async fn ingest_queues_and_drops_when_full() {
    let mut config = VicwConfig::default();
    config.queue.capacity = 2;
    let h = harness(config);

    // No worker running — the queue stalls at capacity.
    for _ in 0..2 {
        let (status, body) = post_json(
            &h.router,
            "/ingest",
            serde_json::json!({ "document": "a document worth remembering" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "queued");
    }
    let (status, body) = post_json(
        &h.router,
        "/ingest",
        serde_json::json!({ "document": "one too many" }),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "QUEUE_FULL");

    let (_, stats) = get_json(&h.router, "/stats").await;
    assert_eq!(stats["queue"]["current_size"], 2);
    assert_eq!(stats["queue"]["dropped_total"], 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn worker_drains_ingested_documents() {
    let h = harness(VicwConfig::default());

    let semantic = Arc::new(SemanticManager::new(
        h.state.chunks.clone(),
        Arc::new(InMemoryVectorIndex::new(h.state.config.embedding.dim)),
        {
            let conn = Connection::open_in_memory().unwrap();
            init_db(&conn).unwrap();
            Arc::new(SqliteGraphStore::new(conn))
        },
        Arc::new(HashedEmbedder::new(h.state.config.embedding.dim)),
        h.state.config.worker.clone(),
        h.state.config.state.clone(),
    ));
    let worker = ColdWorker::new(
        h.state.queue.clone(),
        h.state.latch.clone(),
        semantic,
        10,
        8,
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(worker.run(shutdown_rx));

    let (status, body) = post_json(
        &h.router,
        "/ingest",
        serde_json::json!({
            "document": "The reactor manual. Keep coolant above the red line.",
            "metadata": { "source": "manual.pdf" }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let chunk_id = body["chunk_id"].as_str().unwrap().to_string();

    for _ in 0..100 {
        if h.state.chunks.count().unwrap() == 1 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(h.state.chunks.count().unwrap(), 1);

    // The request metadata was persisted with the chunk, not just echoed.
    let record = h
        .state
        .chunks
        .get(&vicw_core::types::ChunkId::from(chunk_id.as_str()))
        .unwrap()
        .unwrap();
    assert_eq!(
        record.metadata,
        Some(serde_json::json!({ "source": "manual.pdf" }))
    );
    shutdown_tx.send(true).unwrap();
}

#[tokio::test]
async fn reset_clears_live_window() {
    let h = harness(VicwConfig::default());
    post_json(&h.router, "/chat", serde_json::json!({ "message": "hello" })).await;

    let (_, stats) = get_json(&h.router, "/stats").await;
    assert_eq!(stats["context"]["message_count"], 2);

    let (status, body) = post_json(&h.router, "/reset", serde_json::json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (_, stats) = get_json(&h.router, "/stats").await;
    assert_eq!(stats["context"]["message_count"], 0);
}

#[tokio::test]
async fn health_reports_model() {
    let h = harness(VicwConfig::default());
    let (status, body) = get_json(&h.router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["model"], h.state.config.llm.model);
}

#[tokio::test]
async fn openai_compat_round_trip() {
    let h = harness(VicwConfig::default());

    let (status, body) = get_json(&h.router, "/v1/models").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["id"], h.state.config.llm.model);

    let (status, body) = post_json(
        &h.router,
        "/v1/chat/completions",
        serde_json::json!({
            "model": "whatever",
            "messages": [
                { "role": "system", "content": "client-side system prompt" },
                { "role": "user", "content": "hello from an OpenAI client" }
            ]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(
        body["choices"][0]["message"]["content"],
        "the scripted answer"
    );
}

#[tokio::test]
async fn sessions_are_isolated() {
    let h = harness(VicwConfig::default());
    post_json(
        &h.router,
        "/chat",
        serde_json::json!({ "message": "hello", "session_id": "alpha" }),
    )
    .await;

    let (_, stats_alpha) = get_json(&h.router, "/stats?session_id=alpha").await;
    let (_, stats_beta) = get_json(&h.router, "/stats?session_id=beta").await;
    assert_eq!(stats_alpha["context"]["message_count"], 2);
    assert_eq!(stats_beta["context"]["message_count"], 0);
}
