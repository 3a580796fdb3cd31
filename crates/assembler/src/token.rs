//! Token estimation utilities.
//!
//! Uses a character-based heuristic: by default ~4 characters per token,
//! which is within ~10% of BPE tokenizers on English text. Both the ratio
//! and the per-item overhead are configurable because no tokenizer is
//! assumed.

use contextual_config::ContextConfig;
use contextual_core::fact::Fact;
use contextual_core::memory::ScoredChunk;
use contextual_core::turn::Turn;

/// Character-ratio token estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenEstimator {
    /// Characters per token, rounded up. Never zero.
    pub chars_per_token: usize,
    /// Fixed cost per rendered item (role markers, delimiters, bullets).
    pub per_item_overhead: usize,
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self {
            chars_per_token: 4,
            per_item_overhead: 4,
        }
    }
}

impl From<&ContextConfig> for TokenEstimator {
    fn from(config: &ContextConfig) -> Self {
        Self {
            chars_per_token: config.chars_per_token.max(1),
            per_item_overhead: config.per_item_overhead,
        }
    }
}

impl TokenEstimator {
    /// Estimate the token count for a string. Rounds up.
    pub fn text(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        let per = self.chars_per_token.max(1);
        text.chars().count().div_ceil(per)
    }

    /// A verbatim turn: content plus overhead.
    pub fn turn(&self, turn: &Turn) -> usize {
        self.per_item_overhead + self.text(&turn.content)
    }

    /// A fact line: `key: value` plus overhead.
    pub fn fact(&self, fact: &Fact) -> usize {
        self.per_item_overhead + self.text(&fact.key) + self.text(&fact.value)
    }

    /// A memory chunk: its summary plus overhead.
    pub fn chunk(&self, chunk: &ScoredChunk) -> usize {
        self.per_item_overhead + self.text(&chunk.chunk.summary)
    }

    pub fn turns(&self, turns: &[Turn]) -> usize {
        turns.iter().map(|t| self.turn(t)).sum()
    }

    pub fn facts(&self, facts: &[Fact]) -> usize {
        facts.iter().map(|f| self.fact(f)).sum()
    }

    pub fn chunks(&self, chunks: &[ScoredChunk]) -> usize {
        chunks.iter().map(|c| self.chunk(c)).sum()
    }
}
