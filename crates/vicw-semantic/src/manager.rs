//! Cold-path semantic manager.
//!
//! For each offload job: summarize → embed → persist chunk → upsert vector
//! → merge graph node → extract and fold state → record entity mentions.
//! Every step is isolated: a failed step is logged and the remaining steps
//! still run, so a dead vector index never costs the durable chunk write.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use vicw_core::config::{StateConfig, WorkerConfig};
use vicw_core::types::{ChunkId, ChunkRecord, OffloadJob};
use vicw_memory::traits::{ChunkStore, Embedder, GraphStore, PointPayload, VectorIndex};

use crate::extract::extract_candidates;
use crate::state::StateMachine;
use crate::summary::extractive_summary;

/// Most entity mentions recorded per chunk.
const MAX_ENTITIES: usize = 8;

pub struct SemanticManager {
    chunks: Arc<dyn ChunkStore>,
    vectors: Arc<dyn VectorIndex>,
    graph: Arc<dyn GraphStore>,
    embedder: Arc<dyn Embedder>,
    states: StateMachine,
    worker_config: WorkerConfig,
    state_config: StateConfig,
}

/// Which steps of a job failed; empty means a clean run.
#[derive(Debug)]
pub struct JobReport {
    pub chunk_id: ChunkId,
    pub failed_steps: Vec<&'static str>,
}

impl JobReport {
    pub fn is_clean(&self) -> bool {
        self.failed_steps.is_empty()
    }
}

impl SemanticManager {
    pub fn new(
        chunks: Arc<dyn ChunkStore>,
        vectors: Arc<dyn VectorIndex>,
        graph: Arc<dyn GraphStore>,
        embedder: Arc<dyn Embedder>,
        worker_config: WorkerConfig,
        state_config: StateConfig,
    ) -> Self {
        let states = StateMachine::new(graph.clone());
        Self {
            chunks,
            vectors,
            graph,
            embedder,
            states,
            worker_config,
            state_config,
        }
    }

    /// Run the full cold-path sequence for one job. Idempotent: re-running
    /// the same job overwrites the chunk row, the vector point, and the
    /// graph node identically.
    pub async fn process_job(&self, job: &OffloadJob) -> JobReport {
        let mut failed: Vec<&'static str> = Vec::new();
        let full_text = job.full_text();

        // Summarization is CPU-bound; keep it off the I/O executor.
        let summary = {
            let text = full_text.clone();
            let lead = self.worker_config.lead_sentences;
            let tail = self.worker_config.tail_sentences;
            let max = self.worker_config.summary_max_tokens;
            match tokio::task::spawn_blocking(move || extractive_summary(&text, lead, tail, max))
                .await
            {
                Ok(s) => s,
                Err(e) => {
                    warn!(chunk_id = %job.chunk_id, error = %e, "summarize failed");
                    failed.push("summarize");
                    String::new()
                }
            }
        };

        let embedding = match self.embedder.embed(&summary).await {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(chunk_id = %job.chunk_id, error = %e, "embed failed");
                failed.push("embed");
                None
            }
        };

        let record = ChunkRecord {
            chunk_id: job.chunk_id.clone(),
            chunk_text: full_text.clone(),
            summary: summary.clone(),
            metadata: job.metadata.clone(),
            token_count: job.token_count(),
            message_count: job.messages.len() as u32,
            created_at: job.created_at,
        };
        if let Err(e) = self.chunks.put(&record) {
            warn!(chunk_id = %job.chunk_id, error = %e, "chunk store write failed");
            failed.push("chunk_store");
        }

        // Skipping the vector write on embedding failure still leaves the
        // chunk retrievable through the graph.
        if let Some(vector) = embedding {
            let payload = PointPayload {
                created_at: job.created_at,
                token_count: record.token_count,
            };
            if let Err(e) = self.vectors.upsert(job.chunk_id.as_str(), &vector, payload) {
                warn!(chunk_id = %job.chunk_id, error = %e, "vector upsert failed");
                failed.push("vector_index");
            }
        }

        if let Err(e) = self
            .graph
            .merge_chunk(&job.chunk_id, &summary, job.created_at)
        {
            warn!(chunk_id = %job.chunk_id, error = %e, "graph merge failed");
            failed.push("graph");
        }

        if self.state_config.enabled {
            for candidate in extract_candidates(&full_text) {
                if let Err(e) = self.states.apply(&candidate) {
                    warn!(
                        chunk_id = %job.chunk_id,
                        description = %candidate.description,
                        error = %e,
                        "state upsert failed"
                    );
                    if !failed.contains(&"state") {
                        failed.push("state");
                    }
                }
            }
        }

        for entity in extract_entities(&full_text) {
            if let Err(e) = self
                .graph
                .merge_entity_mention(&job.chunk_id, &entity, "entity")
            {
                warn!(chunk_id = %job.chunk_id, %entity, error = %e, "entity mention failed");
                if !failed.contains(&"entities") {
                    failed.push("entities");
                }
            }
        }

        JobReport {
            chunk_id: job.chunk_id.clone(),
            failed_steps: failed,
        }
    }
}

/// Capitalized tokens that are not sentence-initial and not pronouns.
/// Best-effort entity spotting; misses are fine, the relational index is
/// supplementary.
fn extract_entities(text: &str) -> Vec<String> {
    const SKIP: [&str; 12] = [
        "I", "We", "You", "It", "The", "A", "An", "This", "That", "They", "He", "She",
    ];
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for sentence in text.split(['.', '!', '?', '\n']) {
        for (i, word) in sentence.split_whitespace().enumerate() {
            if i == 0 {
                continue;
            }
            let word = word.trim_matches(|c: char| !c.is_alphanumeric() && c != '-');
            if word.len() < 3 || SKIP.contains(&word) {
                continue;
            }
            let mut chars = word.chars();
            let initial_upper = chars.next().is_some_and(|c| c.is_uppercase());
            if initial_upper && seen.insert(word.to_string()) {
                out.push(word.to_string());
                if out.len() >= MAX_ENTITIES {
                    return out;
                }
            }
        }
    }
    out
}
