//! Hybrid retrieval: vector search joined with relational graph matches.

use std::sync::Arc;

use tracing::warn;

use vicw_core::config::RetrievalConfig;
use vicw_core::types::{ChunkId, RagResult, SemanticHit};
use vicw_memory::traits::{ChunkStore, Embedder, GraphStore, VectorIndex};

pub struct RetrievalCoordinator {
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorIndex>,
    chunks: Arc<dyn ChunkStore>,
    graph: Arc<dyn GraphStore>,
    config: RetrievalConfig,
}

impl RetrievalCoordinator {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorIndex>,
        chunks: Arc<dyn ChunkStore>,
        graph: Arc<dyn GraphStore>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            vectors,
            chunks,
            graph,
            config,
        }
    }

    /// Semantic + relational lookup for one query. Backend failures degrade
    /// to an empty section; the turn still completes.
    pub async fn retrieve(&self, query: &str) -> RagResult {
        if !self.config.enabled || query.trim().is_empty() {
            return RagResult::default();
        }

        let semantic = self.semantic_hits(query).await.unwrap_or_else(|e| {
            warn!(error = %e, "semantic retrieval failed");
            Vec::new()
        });

        let relational = self
            .graph
            .search_relations(query, self.config.top_k_relational)
            .unwrap_or_else(|e| {
                warn!(error = %e, "relational retrieval failed");
                Vec::new()
            });

        RagResult {
            semantic,
            relational,
        }
    }

    async fn semantic_hits(
        &self,
        query: &str,
    ) -> Result<Vec<SemanticHit>, vicw_memory::StoreError> {
        let vector = self.embedder.embed(query).await?;
        let points = self
            .vectors
            .search(&vector, self.config.top_k_semantic, self.config.min_score)?;
        if points.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<ChunkId> = points.iter().map(|p| ChunkId::from(p.id.as_str())).collect();
        let summaries = self.chunks.summaries(&ids)?;

        // Preserve the index's ranking; drop ids the chunk store no longer
        // holds (best-effort atomicity across backends).
        let hits = points
            .into_iter()
            .filter_map(|p| {
                summaries
                    .iter()
                    .find(|(id, _)| id.as_str() == p.id)
                    .map(|(id, summary)| SemanticHit {
                        chunk_id: id.clone(),
                        summary: summary.clone(),
                        score: p.score,
                    })
            })
            .collect();
        Ok(hits)
    }

    /// Render a result into the `[CONTEXT FROM MEMORY]` block.
    /// Semantic summaries first, then relational triples; empty → None.
    pub fn format_injection(result: &RagResult) -> Option<String> {
        if result.is_empty() {
            return None;
        }
        let mut block = String::from("[CONTEXT FROM MEMORY]");
        for hit in &result.semantic {
            block.push_str(&format!("\n- {}", hit.summary));
        }
        for triple in &result.relational {
            block.push_str(&format!("\n- {triple}"));
        }
        Some(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rusqlite::Connection;
    use vicw_core::types::ChunkRecord;
    use vicw_memory::chunk_store::SqliteChunkStore;
    use vicw_memory::db::init_db;
    use vicw_memory::embed::HashedEmbedder;
    use vicw_memory::graph::SqliteGraphStore;
    use vicw_memory::traits::PointPayload;
    use vicw_memory::vector::InMemoryVectorIndex;

    struct Fixture {
        coordinator: RetrievalCoordinator,
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorIndex>,
        chunks: Arc<dyn ChunkStore>,
        graph: Arc<dyn GraphStore>,
    }

    fn fixture(config: RetrievalConfig) -> Fixture {
        let chunk_conn = Connection::open_in_memory().unwrap();
        init_db(&chunk_conn).unwrap();
        let graph_conn = Connection::open_in_memory().unwrap();
        init_db(&graph_conn).unwrap();

        let embedder: Arc<dyn Embedder> = Arc::new(HashedEmbedder::new(64));
        let vectors: Arc<dyn VectorIndex> = Arc::new(InMemoryVectorIndex::new(64));
        let chunks: Arc<dyn ChunkStore> = Arc::new(SqliteChunkStore::new(chunk_conn));
        let graph: Arc<dyn GraphStore> = Arc::new(SqliteGraphStore::new(graph_conn));

        let coordinator = RetrievalCoordinator::new(
            embedder.clone(),
            vectors.clone(),
            chunks.clone(),
            graph.clone(),
            config,
        );
        Fixture {
            coordinator,
            embedder,
            vectors,
            chunks,
            graph,
        }
    }

    async fn index_chunk(f: &Fixture, id: &str, summary: &str) {
        let record = ChunkRecord {
            chunk_id: ChunkId::from(id),
            chunk_text: summary.to_string(),
            summary: summary.to_string(),
            metadata: None,
            token_count: 50,
            message_count: 2,
            created_at: Utc::now(),
        };
        f.chunks.put(&record).unwrap();
        let vector = f.embedder.embed(summary).await.unwrap();
        f.vectors
            .upsert(
                id,
                &vector,
                PointPayload {
                    created_at: record.created_at,
                    token_count: 50,
                },
            )
            .unwrap();
    }

    #[tokio::test]
    async fn semantic_hits_resolve_summaries() {
        let f = fixture(RetrievalConfig {
            min_score: 0.1,
            ..RetrievalConfig::default()
        });
        index_chunk(&f, "chunk-1", "discussion about the hydro plant turbines").await;
        index_chunk(&f, "chunk-2", "recipe ideas for dinner tonight").await;

        let result = f.coordinator.retrieve("hydro plant status").await;
        assert!(!result.semantic.is_empty());
        assert_eq!(result.semantic[0].chunk_id.as_str(), "chunk-1");
        assert!(result.semantic[0].summary.contains("turbines"));
    }

    #[tokio::test]
    async fn relational_results_follow_semantic() {
        let f = fixture(RetrievalConfig {
            min_score: 0.1,
            ..RetrievalConfig::default()
        });
        index_chunk(&f, "chunk-1", "hydro plant maintenance log").await;
        f.graph
            .merge_chunk(&ChunkId::from("chunk-1"), "hydro plant maintenance log", Utc::now())
            .unwrap();
        f.graph
            .merge_entity_mention(&ChunkId::from("chunk-1"), "Hydro-Plant", "place")
            .unwrap();

        let result = f.coordinator.retrieve("hydro plant").await;
        assert!(!result.relational.is_empty());

        let block = RetrievalCoordinator::format_injection(&result).unwrap();
        assert!(block.starts_with("[CONTEXT FROM MEMORY]"));
        // Summaries precede triples.
        let summary_pos = block.find("maintenance log").unwrap();
        let triple_pos = block.find("[:MENTIONS]").unwrap();
        assert!(summary_pos < triple_pos);
    }

    #[tokio::test]
    async fn empty_result_formats_to_none() {
        let f = fixture(RetrievalConfig::default());
        let result = f.coordinator.retrieve("anything at all").await;
        assert!(result.is_empty());
        assert!(RetrievalCoordinator::format_injection(&result).is_none());
    }

    #[tokio::test]
    async fn disabled_retrieval_returns_nothing() {
        let f = fixture(RetrievalConfig {
            enabled: false,
            ..RetrievalConfig::default()
        });
        index_chunk(&f, "chunk-1", "hydro plant maintenance log").await;
        let result = f.coordinator.retrieve("hydro plant").await;
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn missing_chunk_rows_are_dropped() {
        let f = fixture(RetrievalConfig {
            min_score: 0.1,
            ..RetrievalConfig::default()
        });
        // Vector point without a chunk row behind it.
        let vector = f.embedder.embed("orphaned point").await.unwrap();
        f.vectors
            .upsert(
                "chunk-ghost",
                &vector,
                PointPayload {
                    created_at: Utc::now(),
                    token_count: 10,
                },
            )
            .unwrap();

        let result = f.coordinator.retrieve("orphaned point").await;
        assert!(result.semantic.is_empty());
    }
}
