//! Echo detection and escalating regeneration warnings.
//!
//! A candidate response whose embedding sits within the configured cosine
//! threshold of any recent response is rejected and regenerated with an
//! escalating system-message warning. The warnings live only in the prompt
//! copy built for one attempt; they never enter the live message list.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::warn;

use vicw_context::ring::EchoRing;
use vicw_core::config::EchoConfig;
use vicw_memory::traits::Embedder;

pub struct EchoGuard {
    config: EchoConfig,
    embedder: Arc<dyn Embedder>,
    exhausted: AtomicU64,
}

#[derive(Debug)]
pub enum EchoVerdict {
    Accept { embedding: Option<Vec<f32>> },
    Echo { similarity: f32, embedding: Vec<f32> },
}

impl EchoGuard {
    pub fn new(config: EchoConfig, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            config,
            embedder,
            exhausted: AtomicU64::new(0),
        }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Total attempts per turn: one initial generation plus the retries.
    pub fn final_attempt(&self) -> u32 {
        1 + self.config.max_retries
    }

    /// Compare a candidate against the echo ring. An embedding failure
    /// accepts the response; the guard never blocks a turn.
    pub async fn review(&self, ring: &EchoRing, text: &str) -> EchoVerdict {
        if !self.config.enabled {
            return EchoVerdict::Accept { embedding: None };
        }
        let embedding = match self.embedder.embed(text).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "echo-guard embedding failed, accepting response");
                return EchoVerdict::Accept { embedding: None };
            }
        };
        let similarity = ring.max_similarity(&embedding, text);
        if similarity >= self.config.threshold {
            EchoVerdict::Echo {
                similarity,
                embedding,
            }
        } else {
            EchoVerdict::Accept {
                embedding: Some(embedding),
            }
        }
    }

    /// Warning injected for `attempt` (2-based; attempt 1 is the initial
    /// generation). The final attempt gets the hard pivot directive.
    pub fn warning(&self, attempt: u32, rejected_text: &str) -> String {
        if attempt >= self.final_attempt() {
            return "You are repeating yourself. Conclude the current topic now or pivot \
                    to a concrete next step. Do not restate any earlier answer."
                .to_string();
        }
        if attempt == 2 {
            return "Your last answer was nearly identical to a recent response. \
                    Provide new information or a different angle."
                .to_string();
        }
        let snippet: String = rejected_text.chars().take(80).collect();
        format!(
            "Your previous reply was rejected for repeating earlier output \
             (\"{snippet}…\"). Do not reuse that phrasing. Name one concrete \
             next action and proceed with it."
        )
    }

    /// Strip RAG and state injections on the final attempt?
    pub fn strip_on_final(&self) -> bool {
        self.config.strip_on_final
    }

    pub fn note_exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
    }

    /// ECHO_GUARD_EXHAUSTED counter for /stats.
    pub fn exhausted_count(&self) -> u64 {
        self.exhausted.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vicw_memory::embed::HashedEmbedder;

    fn guard(threshold: f32) -> EchoGuard {
        let config = EchoConfig {
            threshold,
            ..EchoConfig::default()
        };
        EchoGuard::new(config, Arc::new(HashedEmbedder::new(64)))
    }

    #[tokio::test]
    async fn fresh_response_accepted() {
        let g = guard(0.95);
        let ring = EchoRing::new(10);
        let verdict = g.review(&ring, "a brand new answer").await;
        assert!(matches!(verdict, EchoVerdict::Accept { embedding: Some(_) }));
    }

    #[tokio::test]
    async fn identical_response_rejected() {
        let g = guard(0.95);
        let mut ring = EchoRing::new(10);
        let embedder = HashedEmbedder::new(64);
        let text = "the exact same reply";
        let embedding =
            vicw_memory::traits::Embedder::embed(&embedder, text).await.unwrap();
        ring.push(embedding, text);

        match g.review(&ring, text).await {
            EchoVerdict::Echo { similarity, .. } => assert!(similarity >= 0.95),
            other => panic!("expected Echo, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn disabled_guard_accepts_everything() {
        let config = EchoConfig {
            enabled: false,
            ..EchoConfig::default()
        };
        let g = EchoGuard::new(config, Arc::new(HashedEmbedder::new(64)));
        let mut ring = EchoRing::new(10);
        ring.push(vec![0.0; 64], "same");
        assert!(matches!(
            g.review(&ring, "same").await,
            EchoVerdict::Accept { embedding: None }
        ));
    }

    #[test]
    fn warnings_escalate() {
        let g = guard(0.95); // max_retries = 3 -> final attempt 4
        let polite = g.warning(2, "rejected");
        let forceful = g.warning(3, "rejected reply text");
        let last = g.warning(4, "rejected");

        assert!(polite.contains("nearly identical"));
        assert!(forceful.contains("rejected reply text"));
        assert!(last.contains("pivot"));
        assert_ne!(polite, forceful);
        assert_ne!(forceful, last);
    }

    #[test]
    fn exhausted_counter_increments() {
        let g = guard(0.95);
        assert_eq!(g.exhausted_count(), 0);
        g.note_exhausted();
        g.note_exhausted();
        assert_eq!(g.exhausted_count(), 2);
    }
}
