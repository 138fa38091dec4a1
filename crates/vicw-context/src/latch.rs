//! Pause latch between the request handlers and the cold worker.
//!
//! While any LLM generation is in flight the worker must yield the CPU.
//! The latch counts in-flight generations on a watch channel; the worker
//! awaits zero before draining the queue.

use tokio::sync::watch;

#[derive(Clone)]
pub struct PauseLatch {
    tx: watch::Sender<usize>,
}

impl PauseLatch {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx }
    }

    /// Mark a generation in flight. The returned guard releases on drop,
    /// so a cancelled request releases at whatever await point it died.
    pub fn pause(&self) -> PauseGuard {
        self.tx.send_modify(|n| *n += 1);
        PauseGuard {
            tx: self.tx.clone(),
        }
    }

    pub fn paused(&self) -> bool {
        *self.tx.borrow() > 0
    }

    /// Resolve once no generation is in flight.
    pub async fn wait_idle(&self) {
        let mut rx = self.tx.subscribe();
        while *rx.borrow_and_update() > 0 {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for PauseLatch {
    fn default() -> Self {
        Self::new()
    }
}

pub struct PauseGuard {
    tx: watch::Sender<usize>,
}

impl Drop for PauseGuard {
    fn drop(&mut self) {
        self.tx.send_modify(|n| *n = n.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn guard_releases_on_drop() {
        let latch = PauseLatch::new();
        assert!(!latch.paused());

        let guard = latch.pause();
        assert!(latch.paused());
        drop(guard);
        assert!(!latch.paused());
    }

    #[tokio::test]
    async fn nested_guards_count() {
        let latch = PauseLatch::new();
        let g1 = latch.pause();
        let g2 = latch.pause();
        drop(g1);
        assert!(latch.paused());
        drop(g2);
        assert!(!latch.paused());
    }

    #[tokio::test]
    async fn wait_idle_resolves_after_release() {
        let latch = PauseLatch::new();
        let guard = latch.pause();

        let waiter = {
            let latch = latch.clone();
            tokio::spawn(async move { latch.wait_idle().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn wait_idle_immediate_when_clear() {
        let latch = PauseLatch::new();
        latch.wait_idle().await;
    }
}
