//! Bounded context assembly for long conversations.
//!
//! For every new query the assembler composes three sections under a token
//! budget:
//!
//! 1. **Facts** — durable key/values extracted from the conversation
//! 2. **Memory** — summaries of older turns, retrieved by similarity
//! 3. **Recent turns** — the last `window` turns, verbatim
//!
//! Summarization and fact extraction run in the background and never sit
//! on the request path. A [`ConversationSession`] ties it all together.

pub mod assembler;
pub mod local;
pub mod maintenance;
pub mod session;
pub mod token;

pub use assembler::{
    AssembledContext, AssemblyInput, AssemblyMetadata, AssemblyPolicy, ContextAssembler, DropInfo,
    MemoryRecall, MemoryStatus, SectionStats,
};
pub use local::{ExtractiveSummarizer, PatternFactExtractor};
pub use maintenance::{SummarizationPolicy, extract_pairs, summarize_turns};
pub use session::{Capabilities, ConversationSession, MaintenanceJob};
pub use token::TokenEstimator;
