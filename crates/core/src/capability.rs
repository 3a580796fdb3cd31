//! Capability traits — the external services the assembler consumes.
//!
//! Summarization, embedding and fact extraction are black boxes here.
//! Their transports, retries and logging belong to the implementations.

use async_trait::async_trait;

use crate::error::{MaintenanceError, MemoryError};
use crate::turn::Turn;

/// Compresses a contiguous run of turns into summary text.
///
/// May fail transiently; the maintenance path retries on its next trigger.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Implementation name (e.g., "extractive", "llm").
    fn name(&self) -> &str;

    async fn summarize(&self, turns: &[Turn]) -> Result<String, MaintenanceError>;
}

/// Maps text to a dense vector.
///
/// Used for both indexing memory chunks and querying them. An unavailable
/// backend must surface as [`MemoryError::NotReady`].
#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError>;
}

/// Pulls durable key/value facts out of a single turn.
///
/// Best effort: an empty result is a no-op and failures are ignored.
#[async_trait]
pub trait FactExtractor: Send + Sync {
    fn name(&self) -> &str;

    async fn extract_facts(&self, turn: &Turn) -> Result<Vec<(String, String)>, MaintenanceError>;
}
