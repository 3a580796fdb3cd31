//! Per-conversation stores for Contextual: durable facts and
//! similarity-ranked summary chunks.

pub mod embedder;
pub mod facts;
pub mod store;
pub mod vector;

pub use embedder::{HashEmbedder, UnavailableEmbedder};
pub use facts::FactStore;
pub use store::{MemorySnapshot, MemoryStore};
pub use vector::{cosine_similarity, rank_chunks};
