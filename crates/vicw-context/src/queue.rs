//! Bounded offload queue between the hot path and the cold worker.
//!
//! The one rule that matters: `enqueue` never blocks. At capacity the job
//! is dropped and a counter bumped; the hot path never waits on the cold
//! path.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;
use tracing::warn;

use vicw_core::types::OffloadJob;

pub struct OffloadQueue {
    capacity: usize,
    jobs: Mutex<VecDeque<OffloadJob>>,
    enqueued_total: AtomicU64,
    dropped_total: AtomicU64,
    processed_total: AtomicU64,
}

/// Snapshot for GET /stats.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub current_size: usize,
    pub max_size: usize,
    pub processed_total: u64,
    pub dropped_total: u64,
}

impl OffloadQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            jobs: Mutex::new(VecDeque::with_capacity(capacity)),
            enqueued_total: AtomicU64::new(0),
            dropped_total: AtomicU64::new(0),
            processed_total: AtomicU64::new(0),
        }
    }

    /// Returns false when the job was dropped (queue at capacity).
    pub fn enqueue(&self, job: OffloadJob) -> bool {
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.len() >= self.capacity {
            drop(jobs);
            self.dropped_total.fetch_add(1, Ordering::Relaxed);
            warn!(
                chunk_id = %job.chunk_id,
                capacity = self.capacity,
                "offload queue full — job dropped"
            );
            return false;
        }
        jobs.push_back(job);
        self.enqueued_total.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Pop up to `n` jobs in FIFO order.
    pub fn drain_batch(&self, n: usize) -> Vec<OffloadJob> {
        let mut jobs = self.jobs.lock().unwrap();
        let take = n.min(jobs.len());
        jobs.drain(..take).collect()
    }

    /// Called by the worker after a job finishes (success or failure).
    pub fn mark_processed(&self) {
        self.processed_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            current_size: self.len(),
            max_size: self.capacity,
            processed_total: self.processed_total.load(Ordering::Relaxed),
            dropped_total: self.dropped_total.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vicw_core::types::ChunkId;

    fn job(id: &str) -> OffloadJob {
        OffloadJob {
            chunk_id: ChunkId::from(id),
            messages: Vec::new(),
            pinned_header_snapshot: String::new(),
            metadata: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn fifo_order_preserved() {
        let q = OffloadQueue::new(10);
        q.enqueue(job("chunk-1"));
        q.enqueue(job("chunk-2"));
        q.enqueue(job("chunk-3"));

        let batch = q.drain_batch(2);
        assert_eq!(batch[0].chunk_id.as_str(), "chunk-1");
        assert_eq!(batch[1].chunk_id.as_str(), "chunk-2");
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn over_capacity_drops_and_counts() {
        let q = OffloadQueue::new(2);
        assert!(q.enqueue(job("chunk-1")));
        assert!(q.enqueue(job("chunk-2")));
        assert!(!q.enqueue(job("chunk-3")));

        let stats = q.stats();
        assert_eq!(stats.current_size, 2);
        assert_eq!(stats.dropped_total, 1);

        // The dropped job is gone; the queue still holds the first two.
        let batch = q.drain_batch(10);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1].chunk_id.as_str(), "chunk-2");
    }

    #[test]
    fn drain_on_empty_returns_nothing() {
        let q = OffloadQueue::new(4);
        assert!(q.drain_batch(8).is_empty());
        assert!(q.is_empty());
    }
}
