//! # Contextual Core
//!
//! Domain types, capability traits, and error definitions for bounded
//! conversational context assembly. This crate has **no framework
//! dependencies** — it defines the domain model that the store and
//! assembler crates implement against.
//!
//! ## Design Philosophy
//!
//! External services (summarization, embedding, fact extraction) are traits
//! here. Implementations live elsewhere, which keeps the assembler testable
//! with scripted stand-ins.

pub mod capability;
pub mod error;
pub mod event;
pub mod fact;
pub mod memory;
pub mod turn;

// Re-export key types at crate root for ergonomics
pub use capability::{Embedder, FactExtractor, Summarizer};
pub use error::{Error, FactError, MaintenanceError, MemoryError, Result, TurnError};
pub use event::{DomainEvent, EventBus};
pub use fact::Fact;
pub use memory::{MemoryChunk, ScoredChunk};
pub use turn::{ConversationId, Role, Turn, TurnLog, TurnRange};
