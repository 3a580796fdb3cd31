//! Memory store — summary chunks indexed by embedding.
//!
//! `add_chunk` and `supersede` are the only mutators. Queries and
//! snapshots read a consistent copy under a single read lock, so a
//! background summarizer inserting a chunk never exposes a half-applied
//! state to an assembly in progress.

use contextual_core::capability::Embedder;
use contextual_core::error::MemoryError;
use contextual_core::memory::{MemoryChunk, ScoredChunk};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::vector::rank_chunks;

/// An immutable copy of the store's chunks at one point in time.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshot {
    chunks: Vec<MemoryChunk>,
}

impl MemorySnapshot {
    pub fn chunks(&self) -> &[MemoryChunk] {
        &self.chunks
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Rank this snapshot against an already-computed query embedding.
    pub fn rank(
        &self,
        query_embedding: &[f32],
        k: usize,
        min_similarity: Option<f32>,
    ) -> Vec<ScoredChunk> {
        rank_chunks(&self.chunks, query_embedding, k, min_similarity)
    }

    /// Highest turn index already covered by a chunk, 0 when none.
    pub fn covered_through(&self) -> u64 {
        self.chunks.iter().map(|c| c.range.last).max().unwrap_or(0)
    }
}

/// Similarity-searchable store of memory chunks for one conversation.
#[derive(Clone)]
pub struct MemoryStore {
    chunks: Arc<RwLock<Vec<MemoryChunk>>>,
    embedder: Arc<dyn Embedder>,
    min_similarity: Option<f32>,
}

impl MemoryStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            chunks: Arc::new(RwLock::new(Vec::new())),
            embedder,
            min_similarity: None,
        }
    }

    /// Drop query results scoring below `min`.
    pub fn with_min_similarity(mut self, min: Option<f32>) -> Self {
        self.min_similarity = min;
        self
    }

    pub fn min_similarity(&self) -> Option<f32> {
        self.min_similarity
    }

    /// Embed `text` with the store's embedder.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        self.embedder.embed(text).await
    }

    /// Store a chunk, indexing its summary if it has no embedding yet.
    ///
    /// Fails with `OverlappingRange` if any stored chunk shares a turn
    /// with it, and with `NotReady` if the embedder is unavailable.
    pub async fn add_chunk(&self, chunk: MemoryChunk) -> Result<String, MemoryError> {
        let chunk = self.index(chunk).await?;

        let mut chunks = self.chunks.write().await;
        if let Some(existing) = chunks.iter().find(|c| c.range.overlaps(&chunk.range)) {
            return Err(MemoryError::OverlappingRange {
                new: chunk.range.to_string(),
                existing: existing.range.to_string(),
            });
        }

        let id = chunk.id.clone();
        info!(range = %chunk.range, "Memory chunk stored");
        chunks.push(chunk);
        Ok(id)
    }

    /// Store a re-summarization, removing every chunk it fully covers.
    ///
    /// Partial overlaps are still rejected. Returns the removed chunks.
    pub async fn supersede(&self, chunk: MemoryChunk) -> Result<Vec<MemoryChunk>, MemoryError> {
        let chunk = self.index(chunk).await?;

        let mut chunks = self.chunks.write().await;
        if let Some(partial) = chunks
            .iter()
            .find(|c| c.range.overlaps(&chunk.range) && !chunk.range.covers(&c.range))
        {
            return Err(MemoryError::OverlappingRange {
                new: chunk.range.to_string(),
                existing: partial.range.to_string(),
            });
        }

        let (replaced, kept): (Vec<_>, Vec<_>) = chunks
            .drain(..)
            .partition(|c| chunk.range.covers(&c.range));
        *chunks = kept;
        debug!(range = %chunk.range, replaced = replaced.len(), "Memory chunk superseded");
        chunks.push(chunk);
        Ok(replaced)
    }

    /// The `k` chunks most similar to `text`, best first.
    ///
    /// Ties go to the more recently created chunk. Never mutates.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<ScoredChunk>, MemoryError> {
        let embedding = self.embedder.embed(text).await?;
        let chunks = self.chunks.read().await;
        Ok(rank_chunks(&chunks, &embedding, k, self.min_similarity))
    }

    pub async fn snapshot(&self) -> MemorySnapshot {
        MemorySnapshot {
            chunks: self.chunks.read().await.clone(),
        }
    }

    pub async fn covered_through(&self) -> u64 {
        self.chunks
            .read()
            .await
            .iter()
            .map(|c| c.range.last)
            .max()
            .unwrap_or(0)
    }

    pub async fn len(&self) -> usize {
        self.chunks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove every chunk. Only used on conversation teardown.
    pub async fn clear(&self) {
        self.chunks.write().await.clear();
    }

    async fn index(&self, chunk: MemoryChunk) -> Result<MemoryChunk, MemoryError> {
        if chunk.is_indexed() {
            return Ok(chunk);
        }
        let embedding = self.embedder.embed(&chunk.summary).await?;
        Ok(chunk.with_embedding(embedding))
    }
}
