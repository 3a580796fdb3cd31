//! Vector similarity and chunk ranking utilities.
//!
//! Pure-Rust implementations of:
//! - Cosine similarity
//! - Similarity ranking with deterministic tie-breaking

use contextual_core::memory::{MemoryChunk, ScoredChunk};
use std::cmp::Ordering;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if either vector is zero-length, empty, or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Ordering for ranked chunks: higher similarity first, then the newer
/// chunk, then the later turn range.
pub fn rank_order(a: &ScoredChunk, b: &ScoredChunk) -> Ordering {
    b.similarity
        .partial_cmp(&a.similarity)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.chunk.created_at.cmp(&a.chunk.created_at))
        .then_with(|| b.chunk.range.first.cmp(&a.chunk.range.first))
}

/// Rank chunks by cosine similarity to a query embedding.
///
/// Chunks without an embedding are skipped. `min_similarity`, when set,
/// drops anything scoring below it. At most `limit` results are returned.
pub fn rank_chunks(
    chunks: &[MemoryChunk],
    query_embedding: &[f32],
    limit: usize,
    min_similarity: Option<f32>,
) -> Vec<ScoredChunk> {
    let mut scored: Vec<ScoredChunk> = chunks
        .iter()
        .filter(|chunk| chunk.is_indexed())
        .filter_map(|chunk| {
            let similarity = cosine_similarity(&chunk.embedding, query_embedding);
            match min_similarity {
                Some(min) if similarity < min => None,
                _ => Some(ScoredChunk {
                    chunk: chunk.clone(),
                    similarity,
                }),
            }
        })
        .collect();

    scored.sort_by(rank_order);
    scored.truncate(limit);
    scored
}
