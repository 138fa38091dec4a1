//! Background worker draining the offload queue.
//!
//! One long-lived task per process. It waits on the pause latch while any
//! LLM generation is in flight, drains a batch, runs the semantic manager
//! on each job, and sleeps briefly when the queue is empty. A per-job
//! failure bumps a counter; the worker itself never dies on one.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

use vicw_context::latch::PauseLatch;
use vicw_context::queue::OffloadQueue;

use crate::manager::SemanticManager;

pub struct ColdWorker {
    queue: Arc<OffloadQueue>,
    latch: PauseLatch,
    manager: Arc<SemanticManager>,
    idle: Duration,
    batch_size: usize,
    metrics: WorkerMetrics,
}

/// Shared counters; cloned into the gateway for GET /stats.
#[derive(Clone, Default)]
pub struct WorkerMetrics {
    running: Arc<AtomicBool>,
    processed: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerStats {
    pub is_running: bool,
    pub processed_count: u64,
    pub failed_count: u64,
    pub success_rate: f64,
}

impl WorkerMetrics {
    pub fn snapshot(&self) -> WorkerStats {
        let processed = self.processed.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let total = processed + failed;
        WorkerStats {
            is_running: self.running.load(Ordering::Relaxed),
            processed_count: processed,
            failed_count: failed,
            success_rate: if total == 0 {
                1.0
            } else {
                processed as f64 / total as f64
            },
        }
    }
}

impl ColdWorker {
    pub fn new(
        queue: Arc<OffloadQueue>,
        latch: PauseLatch,
        manager: Arc<SemanticManager>,
        idle_ms: u64,
        batch_size: usize,
    ) -> Self {
        Self {
            queue,
            latch,
            manager,
            idle: Duration::from_millis(idle_ms),
            batch_size: batch_size.max(1),
            metrics: WorkerMetrics::default(),
        }
    }

    pub fn metrics(&self) -> WorkerMetrics {
        self.metrics.clone()
    }

    /// Main loop. Runs until `shutdown` broadcasts true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("cold-path worker started");
        self.metrics.running.store(true, Ordering::Relaxed);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("cold-path worker shutting down");
                        break;
                    }
                }
                _ = self.cycle() => {}
            }
        }
        self.metrics.running.store(false, Ordering::Relaxed);
    }

    async fn cycle(&self) {
        // Generation in flight — yield the CPU until the latch clears.
        self.latch.wait_idle().await;

        let batch = self.queue.drain_batch(self.batch_size);
        if batch.is_empty() {
            tokio::time::sleep(self.idle).await;
            return;
        }

        debug!(jobs = batch.len(), "processing offload batch");
        for job in &batch {
            let report = self.manager.process_job(job).await;
            self.queue.mark_processed();
            if report.is_clean() {
                self.metrics.processed.fetch_add(1, Ordering::Relaxed);
            } else {
                self.metrics.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
