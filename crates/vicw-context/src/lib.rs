pub mod latch;
pub mod manager;
pub mod queue;
pub mod ring;
pub mod tokens;

pub use latch::{PauseGuard, PauseLatch};
pub use manager::{ContextManager, ContextStats};
pub use queue::{OffloadQueue, QueueStats};
pub use ring::{EchoEntry, EchoRing};
pub use tokens::estimate_tokens;
