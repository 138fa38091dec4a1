pub mod chunk_store;
pub mod db;
pub mod embed;
pub mod error;
pub mod graph;
pub mod traits;
pub mod vector;

pub use chunk_store::SqliteChunkStore;
pub use embed::{cosine_similarity, HashedEmbedder};
pub use error::StoreError;
pub use graph::SqliteGraphStore;
pub use traits::{ChunkStore, Embedder, GraphStore, PointPayload, ScoredPoint, VectorIndex};
pub use vector::InMemoryVectorIndex;
