//! Context assembly — the core of Contextual.
//!
//! Composes a bounded prompt from three sections, in fixed order:
//!
//! 1. **Facts** (durable key/values) — never dropped
//! 2. **Memory** (retrieved summary chunks) — lowest-similarity dropped first
//! 3. **Recent turns** (verbatim window) — oldest dropped next, query turn kept
//!
//! # Determinism
//!
//! `assemble` is a pure function of its input snapshots: identical inputs
//! always produce identical outputs, and no store is touched. The caller is
//! responsible for taking consistent snapshots and for running the memory
//! query (see [`crate::session::ConversationSession::assemble`]).

use contextual_config::ContextConfig;
use contextual_core::fact::Fact;
use contextual_core::memory::ScoredChunk;
use contextual_core::turn::Turn;
use contextual_memory::vector::rank_order;
use serde::{Deserialize, Serialize};

use crate::token::TokenEstimator;

const FACTS_HEADER: &str = "[Known Facts]";
const MEMORY_HEADER: &str = "[Conversation Memory]";
const RECENT_HEADER: &str = "[Recent Conversation]";

// ── Types ─────────────────────────────────────────────────────────────────

/// Outcome of the memory query that feeds an assembly.
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryRecall {
    /// Chunks returned by the memory store, best first.
    Retrieved(Vec<ScoredChunk>),
    /// The embedding backend was unavailable; assemble without memory.
    NotReady(String),
    /// No turns have left the window, so memory was not queried.
    NotNeeded,
}

/// Knobs for one assembler instance.
#[derive(Debug, Clone)]
pub struct AssemblyPolicy {
    /// Most-recent turns kept verbatim, including the query turn.
    pub window: usize,
    /// Memory chunks requested per assembly.
    pub retrieve_k: usize,
    /// Upper bound on the estimated context size.
    pub token_budget: usize,
    pub estimator: TokenEstimator,
}

impl Default for AssemblyPolicy {
    fn default() -> Self {
        Self::from(&ContextConfig::default())
    }
}

impl From<&ContextConfig> for AssemblyPolicy {
    fn from(config: &ContextConfig) -> Self {
        Self {
            window: config.window.max(1),
            retrieve_k: config.retrieve_k,
            token_budget: config.token_budget,
            estimator: TokenEstimator::from(config),
        }
    }
}

/// Snapshot inputs for a single assembly pass.
pub struct AssemblyInput<'a> {
    /// Fact store snapshot, in insertion order.
    pub facts: &'a [Fact],
    /// Result of querying the memory store with the current query text.
    pub recall: &'a MemoryRecall,
    /// The full turn log. The last turn is the current query.
    pub turns: &'a [Turn],
}

/// The assembled, bounded context for one query. Ephemeral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledContext {
    /// All facts, in insertion order.
    pub facts: Vec<Fact>,
    /// Retrieved memory chunks, highest similarity first.
    pub memory: Vec<ScoredChunk>,
    /// Verbatim recent turns, chronological; the query turn is last.
    pub recent: Vec<Turn>,
    pub metadata: AssemblyMetadata,
}

/// Detailed metadata about the assembly process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyMetadata {
    /// Estimated tokens of the assembled context.
    pub total_tokens: usize,
    /// Configured token budget.
    pub budget: usize,
    /// Set when facts plus the query turn alone exceed the budget.
    pub over_budget: bool,
    /// Per-section statistics, in render order.
    pub sections: Vec<SectionStats>,
    /// Items dropped to fit the budget.
    pub drops: Vec<DropInfo>,
    pub memory_status: MemoryStatus,
}

/// Statistics for a single context section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionStats {
    pub name: String,
    pub tokens: usize,
    pub items_included: usize,
    pub items_total: usize,
}

/// Items dropped from a section during budget enforcement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropInfo {
    pub section: String,
    pub items_dropped: usize,
    pub tokens_dropped: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MemoryStatus {
    Retrieved { candidates: usize },
    NotReady { reason: String },
    NotNeeded,
}

impl AssembledContext {
    /// The current query turn.
    pub fn query(&self) -> Option<&Turn> {
        self.recent.last()
    }

    /// Render the context as prompt text, one header per non-empty section.
    pub fn render(&self) -> String {
        let mut sections = Vec::new();

        if !self.facts.is_empty() {
            let mut s = String::from(FACTS_HEADER);
            for fact in &self.facts {
                s.push_str(&format!("\n- {}: {}", fact.key, fact.value));
            }
            sections.push(s);
        }

        if !self.memory.is_empty() {
            let mut s = String::from(MEMORY_HEADER);
            for scored in &self.memory {
                s.push_str(&format!(
                    "\n- (turns {}) {}",
                    scored.chunk.range, scored.chunk.summary
                ));
            }
            sections.push(s);
        }

        if !self.recent.is_empty() {
            let mut s = String::from(RECENT_HEADER);
            for turn in &self.recent {
                s.push_str(&format!("\n{}: {}", turn.role, turn.content));
            }
            sections.push(s);
        }

        sections.join("\n\n")
    }
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// The context assembler. Stateless, so one instance can be reused.
#[derive(Debug, Clone, Default)]
pub struct ContextAssembler {
    policy: AssemblyPolicy,
}

impl ContextAssembler {
    pub fn new(policy: AssemblyPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &AssemblyPolicy {
        &self.policy
    }

    /// Split the log into `(older, recent)`; `recent` is the last `window` turns.
    pub fn partition<'t>(&self, turns: &'t [Turn]) -> (&'t [Turn], &'t [Turn]) {
        let split = turns.len().saturating_sub(self.policy.window.max(1));
        turns.split_at(split)
    }

    /// Whether any turn has left the window, i.e. memory is worth querying.
    pub fn needs_memory(&self, turns: &[Turn]) -> bool {
        !self.partition(turns).0.is_empty()
    }

    /// Assemble a bounded context. Never fails.
    ///
    /// # Algorithm
    ///
    /// 1. Partition turns into older / recent
    /// 2. Use recalled chunks only if older turns exist, capped at `retrieve_k`
    /// 3. Sum section costs: facts → memory → recent
    /// 4. While over budget: drop lowest-similarity chunks, then oldest
    ///    recent turns, never facts and never the query turn
    /// 5. Flag `over_budget` if the protected content alone does not fit
    pub fn assemble(&self, input: &AssemblyInput<'_>) -> AssembledContext {
        let est = &self.policy.estimator;
        let (older, recent) = self.partition(input.turns);

        let facts = input.facts.to_vec();
        let (mut memory, memory_status) = match (older.is_empty(), input.recall) {
            (true, _) | (false, MemoryRecall::NotNeeded) => (Vec::new(), MemoryStatus::NotNeeded),
            (false, MemoryRecall::NotReady(reason)) => (
                Vec::new(),
                MemoryStatus::NotReady {
                    reason: reason.clone(),
                },
            ),
            (false, MemoryRecall::Retrieved(chunks)) => {
                let mut chunks = chunks.clone();
                chunks.sort_by(rank_order);
                chunks.truncate(self.policy.retrieve_k);
                let candidates = chunks.len();
                (chunks, MemoryStatus::Retrieved { candidates })
            }
        };
        let mut recent: Vec<Turn> = recent.to_vec();

        let memory_total = memory.len();
        let recent_total = recent.len();
        let facts_tokens = self.section_tokens(FACTS_HEADER, est.facts(&facts), facts.len());
        let mut memory_tokens =
            self.section_tokens(MEMORY_HEADER, est.chunks(&memory), memory.len());
        let mut recent_tokens =
            self.section_tokens(RECENT_HEADER, est.turns(&recent), recent.len());
        let budget = self.policy.token_budget;
        let mut drops = Vec::new();

        // ── Drop memory, lowest similarity first ───────────────────────────
        let mut dropped = 0;
        let mut dropped_tokens = 0;
        while facts_tokens + memory_tokens + recent_tokens > budget {
            let Some(chunk) = memory.pop() else { break };
            dropped += 1;
            dropped_tokens += est.chunk(&chunk);
            memory_tokens = self.section_tokens(MEMORY_HEADER, est.chunks(&memory), memory.len());
        }
        let reason = "Lowest-similarity chunks dropped";
        if let Some(d) = Self::maybe_drop("memory", dropped, dropped_tokens, reason) {
            drops.push(d);
        }

        // ── Drop recent turns, oldest first, keep the query ────────────────
        let mut dropped = 0;
        let mut dropped_tokens = 0;
        while facts_tokens + memory_tokens + recent_tokens > budget && recent.len() > 1 {
            let turn = recent.remove(0);
            dropped += 1;
            dropped_tokens += est.turn(&turn);
            recent_tokens = self.section_tokens(RECENT_HEADER, est.turns(&recent), recent.len());
        }
        let reason = "Oldest turns dropped, query kept";
        if let Some(d) = Self::maybe_drop("recent", dropped, dropped_tokens, reason) {
            drops.push(d);
        }

        let total_tokens = facts_tokens + memory_tokens + recent_tokens;

        let sections = vec![
            SectionStats {
                name: "facts".into(),
                tokens: facts_tokens,
                items_included: facts.len(),
                items_total: facts.len(),
            },
            SectionStats {
                name: "memory".into(),
                tokens: memory_tokens,
                items_included: memory.len(),
                items_total: memory_total,
            },
            SectionStats {
                name: "recent".into(),
                tokens: recent_tokens,
                items_included: recent.len(),
                items_total: recent_total,
            },
        ];

        AssembledContext {
            facts,
            memory,
            recent,
            metadata: AssemblyMetadata {
                total_tokens,
                budget,
                over_budget: total_tokens > budget,
                sections,
                drops,
                memory_status,
            },
        }
    }

    // ── Helpers ────────────────────────────────────────────────────────────

    fn section_tokens(&self, header: &str, body_tokens: usize, items: usize) -> usize {
        if items == 0 {
            0
        } else {
            self.policy.estimator.text(header) + body_tokens
        }
    }

    fn maybe_drop(section: &str, count: usize, tokens: usize, reason: &str) -> Option<DropInfo> {
        if count > 0 {
            Some(DropInfo {
                section: section.into(),
                items_dropped: count,
                tokens_dropped: tokens,
                reason: reason.into(),
            })
        } else {
            None
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
