//! Error types for the Contextual domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Contextual operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Turn log errors ---
    #[error("Turn error: {0}")]
    Turn(#[from] TurnError),

    // --- Fact store errors ---
    #[error("Fact error: {0}")]
    Fact(#[from] FactError),

    // --- Memory store errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Background maintenance ---
    #[error("Maintenance error: {0}")]
    Maintenance(#[from] MaintenanceError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Lifecycle ---
    #[error("Conversation {0} is closed")]
    Closed(String),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum TurnError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, Clone, Error)]
pub enum FactError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    /// The embedding backend cannot serve requests right now.
    #[error("Memory backend not ready: {0}")]
    NotReady(String),

    #[error("Chunk range {new} overlaps stored chunk {existing}")]
    OverlappingRange { new: String, existing: String },

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),
}

impl MemoryError {
    /// Whether the failure means "try again later" rather than bad input.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::NotReady(_))
    }
}

#[derive(Debug, Clone, Error)]
pub enum MaintenanceError {
    #[error("Summarization failed for turns {range}: {reason}")]
    SummarizationFailed { range: String, reason: String },

    #[error("Fact extraction failed for turn {turn_index}: {reason}")]
    ExtractionFailed { turn_index: u64, reason: String },
}
