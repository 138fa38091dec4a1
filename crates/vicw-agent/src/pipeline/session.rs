use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use vicw_context::manager::ContextManager;
use vicw_context::queue::OffloadQueue;
use vicw_context::ring::EchoRing;
use vicw_core::config::VicwConfig;

/// One conversation's mutable hot-path state behind a single mutex.
///
/// Every hot-path mutation (admit, prompt assembly, echo ring) takes the
/// lock; a session is typically single-client so contention is minimal.
pub struct Session {
    inner: Mutex<SessionInner>,
}

pub struct SessionInner {
    pub context: ContextManager,
    pub ring: EchoRing,
}

impl Session {
    pub fn new(config: &VicwConfig, queue: Arc<OffloadQueue>) -> Self {
        Self {
            inner: Mutex::new(SessionInner {
                context: ContextManager::new(&config.context, queue),
                ring: EchoRing::new(config.echo.history),
            }),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().await
    }
}
