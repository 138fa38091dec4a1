//! Deterministic local embedder.
//!
//! Feature-hashes word unigrams and bigrams into a fixed number of buckets
//! and L2-normalizes the result. Not a learned embedding: identical text
//! always maps to the same vector, and near-identical text (the echo case)
//! maps to a nearly identical one.

use async_trait::async_trait;

use crate::error::Result;
use crate::traits::Embedder;

/// Cosine similarity between two equal-length vectors.
/// Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

pub struct HashedEmbedder {
    dim: usize,
}

impl HashedEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        let tokens: Vec<String> = text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect();

        for token in &tokens {
            v[fnv1a(token.as_bytes()) as usize % self.dim] += 1.0;
        }
        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            v[fnv1a(bigram.as_bytes()) as usize % self.dim] += 1.0;
        }

        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl Embedder for HashedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

/// FNV-1a, 64-bit.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deterministic_for_same_input() {
        let embedder = HashedEmbedder::new(384);
        let a = embedder.embed("we sailed to the hydro-plant").await.unwrap();
        let b = embedder.embed("we sailed to the hydro-plant").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 384);
    }

    #[tokio::test]
    async fn identical_text_has_unit_similarity() {
        let embedder = HashedEmbedder::new(384);
        let a = embedder.embed("exactly the same answer").await.unwrap();
        let b = embedder.embed("exactly the same answer").await.unwrap();
        let sim = cosine_similarity(&a, &b);
        assert!((sim - 1.0).abs() < 1e-6, "expected ~1.0, got {sim}");
    }

    #[tokio::test]
    async fn different_text_scores_lower() {
        let embedder = HashedEmbedder::new(384);
        let a = embedder.embed("the reactor core is overheating").await.unwrap();
        let b = embedder.embed("what should we cook for dinner").await.unwrap();
        assert!(cosine_similarity(&a, &b) < 0.5);
    }

    #[test]
    fn cosine_zero_vector_is_zero() {
        let a = vec![0.0, 0.0, 0.0];
        let b = vec![1.0, 2.0, 3.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
        assert_eq!(cosine_similarity(&b, &a), 0.0);
    }

    #[tokio::test]
    async fn empty_text_embeds_to_zero_vector() {
        let embedder = HashedEmbedder::new(64);
        let v = embedder.embed("").await.unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }
}
