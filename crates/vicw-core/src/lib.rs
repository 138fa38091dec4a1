pub mod config;
pub mod error;
pub mod types;

pub use config::VicwConfig;
pub use error::{Result, VicwError};
pub use types::{
    ChunkId, ChunkRecord, Message, OffloadEvent, OffloadJob, RagResult, Role, SemanticHit,
    StateCandidate, StateNode, StateStatus, StateType,
};
