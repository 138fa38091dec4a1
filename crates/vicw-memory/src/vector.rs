//! In-memory vector index for semantic search.
//!
//! Brute-force cosine scan over a DashMap. At the scale this engine offloads
//! (hundreds to low thousands of chunks per deployment) a linear scan beats
//! the operational cost of an external ANN service; the trait seam allows
//! swapping one in without touching the retrieval path.

use dashmap::DashMap;

use crate::embed::cosine_similarity;
use crate::error::{Result, StoreError};
use crate::traits::{PointPayload, ScoredPoint, VectorIndex};

struct Point {
    vector: Vec<f32>,
    payload: PointPayload,
}

pub struct InMemoryVectorIndex {
    dim: usize,
    points: DashMap<String, Point>,
}

impl InMemoryVectorIndex {
    /// `dim` is pinned for the life of the index; see [`VectorIndex`].
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            points: DashMap::new(),
        }
    }

    fn check_dim(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dim {
            return Err(StoreError::DimensionMismatch {
                expected: self.dim,
                got: vector.len(),
            });
        }
        Ok(())
    }
}

impl VectorIndex for InMemoryVectorIndex {
    fn upsert(&self, id: &str, vector: &[f32], payload: PointPayload) -> Result<()> {
        self.check_dim(vector)?;
        self.points.insert(
            id.to_string(),
            Point {
                vector: vector.to_vec(),
                payload,
            },
        );
        Ok(())
    }

    fn search(&self, vector: &[f32], k: usize, min_score: f32) -> Result<Vec<ScoredPoint>> {
        self.check_dim(vector)?;

        let mut hits: Vec<ScoredPoint> = self
            .points
            .iter()
            .map(|entry| ScoredPoint {
                id: entry.key().clone(),
                score: cosine_similarity(vector, &entry.vector),
                payload: entry.payload,
            })
            .filter(|p| p.score >= min_score)
            .collect();

        // Score descending; equal scores prefer the newer chunk.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.payload.created_at.cmp(&a.payload.created_at))
        });
        hits.truncate(k);
        Ok(hits)
    }

    fn len(&self) -> usize {
        self.points.len()
    }
}
