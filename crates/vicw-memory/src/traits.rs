//! Backend seams for the three persistence stores and the embedder.
//!
//! The hot and cold paths only see these traits; concrete backends
//! (SQLite, the in-memory index, an HTTP embedding endpoint) are injected
//! at startup. Keeping them small makes the whole engine testable with
//! in-process fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use vicw_core::types::{ChunkId, ChunkRecord, StateNode, StateStatus, StateType};

use crate::error::Result;

/// Filterable payload stored alongside each vector point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointPayload {
    pub created_at: DateTime<Utc>,
    pub token_count: u32,
}

/// One nearest-neighbour search hit.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: PointPayload,
}

/// Durable key → record store for offloaded chunks.
pub trait ChunkStore: Send + Sync {
    /// Idempotent write: the same chunk_id overwrites identically.
    fn put(&self, record: &ChunkRecord) -> Result<()>;

    fn get(&self, chunk_id: &ChunkId) -> Result<Option<ChunkRecord>>;

    /// Resolve many ids to their summaries in one round trip.
    /// Unknown ids are silently skipped.
    fn summaries(&self, chunk_ids: &[ChunkId]) -> Result<Vec<(ChunkId, String)>>;

    fn count(&self) -> Result<u64>;
}

/// Approximate-nearest-neighbour store over chunk-summary embeddings.
///
/// The dimension is pinned at construction; mixed-dimension writes and
/// queries are refused with `DimensionMismatch`.
pub trait VectorIndex: Send + Sync {
    fn upsert(&self, id: &str, vector: &[f32], payload: PointPayload) -> Result<()>;

    /// Top-k by cosine similarity, filtered to `score >= min_score`,
    /// ties broken by newer `created_at` first.
    fn search(&self, vector: &[f32], k: usize, min_score: f32) -> Result<Vec<ScoredPoint>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Labeled property graph of Chunk, Entity, and State nodes.
pub trait GraphStore: Send + Sync {
    /// MERGE semantics: create the Chunk node or update its summary.
    fn merge_chunk(
        &self,
        chunk_id: &ChunkId,
        summary: &str,
        created_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Opportunistically record `(:Chunk)-[:MENTIONS]->(:Entity)`.
    fn merge_entity_mention(
        &self,
        chunk_id: &ChunkId,
        entity: &str,
        entity_type: &str,
    ) -> Result<()>;

    /// Case-insensitive substring match over node names and summaries,
    /// returning formatted `(A)-[:REL]->(B)` triples.
    fn search_relations(&self, query: &str, limit: usize) -> Result<Vec<String>>;

    /// States filtered by type (None = all) and status, most recently
    /// updated first.
    fn states(
        &self,
        state_type: Option<StateType>,
        status: StateStatus,
        limit: usize,
    ) -> Result<Vec<StateNode>>;

    fn create_state(
        &self,
        state_type: StateType,
        description: &str,
        normalized: &str,
        status: StateStatus,
    ) -> Result<StateNode>;

    /// Status transition. Any move out of `active` resets visit_count to 0.
    fn set_state_status(&self, state_id: &str, status: StateStatus) -> Result<()>;

    /// Increment visit_count and stamp last_visited (injection evidence).
    fn record_visit(&self, state_id: &str, now: DateTime<Utc>) -> Result<()>;

    /// Refresh updated_at without changing anything else (re-observation).
    fn touch_state(&self, state_id: &str) -> Result<()>;
}

/// Pure text → fixed-dimension vector function.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn dimension(&self) -> usize;
}
