//! Memory chunks — compressed summaries of older conversation segments.
//!
//! A chunk covers a contiguous [`TurnRange`] and carries an embedding so
//! it can be recalled by similarity to the current query. Chunks are
//! immutable; re-summarizing a range produces a new chunk that supersedes
//! the old one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::turn::TurnRange;

/// A compressed summary of a contiguous range of turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryChunk {
    /// Unique ID for this chunk
    pub id: String,

    /// Summary text produced by the summarization capability
    pub summary: String,

    /// The turns this chunk summarizes
    pub range: TurnRange,

    /// Embedding of `summary`; empty until indexed by the store
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,

    /// When this chunk was created
    pub created_at: DateTime<Utc>,
}

impl MemoryChunk {
    /// Create an unindexed chunk. The memory store embeds it on insert.
    pub fn new(summary: impl Into<String>, range: TurnRange) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            summary: summary.into(),
            range,
            embedding: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }

    pub fn is_indexed(&self) -> bool {
        !self.embedding.is_empty()
    }
}

/// A chunk returned by a similarity query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: MemoryChunk,

    /// Cosine similarity to the query embedding
    pub similarity: f32,
}
