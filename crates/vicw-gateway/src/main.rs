use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use rusqlite::Connection;
use tokio::sync::watch;
use tracing::info;

use vicw_agent::embed_http::HttpEmbedder;
use vicw_agent::openai::OpenAiClient;
use vicw_context::latch::PauseLatch;
use vicw_context::queue::OffloadQueue;
use vicw_core::config::{EmbeddingProvider, VicwConfig};
use vicw_memory::chunk_store::SqliteChunkStore;
use vicw_memory::db::init_db;
use vicw_memory::embed::HashedEmbedder;
use vicw_memory::graph::SqliteGraphStore;
use vicw_memory::traits::{ChunkStore, Embedder, GraphStore, VectorIndex};
use vicw_memory::vector::InMemoryVectorIndex;
use vicw_semantic::manager::SemanticManager;
use vicw_semantic::worker::ColdWorker;

use vicw_gateway::app;

#[derive(Parser)]
#[command(name = "vicw-gateway", about = "Virtual infinite context window gateway")]
struct Args {
    /// Path to vicw.toml (overrides VICW_CONFIG and the default path).
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vicw_gateway=info,tower_http=debug".into()),
        )
        .init();

    // load config: --config flag > VICW_CONFIG env > ~/.vicw/vicw.toml
    let args = Args::parse();
    let config_path = args.config.or_else(|| std::env::var("VICW_CONFIG").ok());
    let config = VicwConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        VicwConfig::default()
    });

    // One database file; separate connections so the hot path's state
    // queries never contend with the worker's bulk writes on one handle.
    if let Some(parent) = std::path::Path::new(&config.database.path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let chunk_conn = open_db(&config.database.path)?;
    let graph_conn = open_db(&config.database.path)?;

    let chunks: Arc<dyn ChunkStore> = Arc::new(SqliteChunkStore::new(chunk_conn));
    let graph: Arc<dyn GraphStore> = Arc::new(SqliteGraphStore::new(graph_conn));
    let vectors: Arc<dyn VectorIndex> = Arc::new(InMemoryVectorIndex::new(config.embedding.dim));
    let embedder: Arc<dyn Embedder> = match config.embedding.provider {
        EmbeddingProvider::Hashed => Arc::new(HashedEmbedder::new(config.embedding.dim)),
        EmbeddingProvider::Http => Arc::new(HttpEmbedder::new(&config.embedding)),
    };
    let llm = Arc::new(OpenAiClient::new(&config.llm));

    let queue = Arc::new(OffloadQueue::new(config.queue.capacity));
    let latch = PauseLatch::new();

    let semantic = Arc::new(SemanticManager::new(
        chunks.clone(),
        vectors.clone(),
        graph.clone(),
        embedder.clone(),
        config.worker.clone(),
        config.state.clone(),
    ));
    let worker = ColdWorker::new(
        queue.clone(),
        latch.clone(),
        semantic,
        config.worker.idle_ms,
        config.worker.batch_size,
    );
    let worker_metrics = worker.metrics();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(worker.run(shutdown_rx));

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;
    let state = Arc::new(app::AppState::new(
        config,
        llm,
        embedder,
        chunks,
        vectors,
        graph,
        queue,
        latch,
        worker_metrics,
    ));
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("VICW gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    let _ = shutdown_tx.send(true);
    Ok(())
}

fn open_db(path: &str) -> anyhow::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    init_db(&conn)?;
    Ok(conn)
}
