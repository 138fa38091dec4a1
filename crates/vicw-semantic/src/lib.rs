pub mod catalog;
pub mod extract;
pub mod manager;
pub mod normalize;
pub mod retrieval;
pub mod state;
pub mod summary;
pub mod worker;

pub use extract::extract_candidates;
pub use manager::{JobReport, SemanticManager};
pub use normalize::{fuzzy_match, normalize_description};
pub use retrieval::RetrievalCoordinator;
pub use state::{StateMachine, StateSnapshot};
pub use summary::extractive_summary;
pub use worker::{ColdWorker, WorkerMetrics, WorkerStats};
