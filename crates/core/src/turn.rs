//! Turn and conversation log domain types.
//!
//! A conversation is an append-only log of turns:
//! user asks → turn appended → context assembled → assistant answers → turn appended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TurnError;

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message in a conversation. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Sequence index within the conversation, starting at 1
    pub index: u64,

    /// Who sent this turn
    pub role: Role,

    /// The text content
    pub content: String,

    /// When the turn was recorded
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(index: u64, role: Role, content: impl Into<String>) -> Self {
        Self {
            index,
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// An inclusive range of turn indices, e.g. turns 1–4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnRange {
    pub first: u64,
    pub last: u64,
}

impl TurnRange {
    /// Build a range. `first > last` is rejected.
    pub fn new(first: u64, last: u64) -> Result<Self, TurnError> {
        if first > last {
            return Err(TurnError::InvalidArgument(format!(
                "range start {first} is after range end {last}"
            )));
        }
        Ok(Self { first, last })
    }

    /// Range spanning the given turns. `None` for an empty slice.
    pub fn spanning(turns: &[Turn]) -> Option<Self> {
        let first = turns.first()?.index;
        let last = turns.last()?.index;
        Some(Self { first, last })
    }

    /// Number of turn indices in the range. Never zero.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.last - self.first + 1
    }

    pub fn contains(&self, index: u64) -> bool {
        self.first <= index && index <= self.last
    }

    pub fn overlaps(&self, other: &TurnRange) -> bool {
        self.first <= other.last && other.first <= self.last
    }

    /// Whether `other` lies entirely inside this range.
    pub fn covers(&self, other: &TurnRange) -> bool {
        self.first <= other.first && other.last <= self.last
    }
}

impl std::fmt::Display for TurnRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.first, self.last)
    }
}

/// The ordered, append-only turn log of one conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnLog {
    /// Unique conversation ID
    pub id: ConversationId,

    /// Ordered turns, indices strictly increasing
    turns: Vec<Turn>,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// When the last turn was added
    pub updated_at: DateTime<Utc>,
}

impl TurnLog {
    /// Create a new empty log.
    pub fn new() -> Self {
        Self::with_id(ConversationId::new())
    }

    pub fn with_id(id: ConversationId) -> Self {
        let now = Utc::now();
        Self {
            id,
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a new turn, assigning the next sequence index.
    pub fn push(&mut self, role: Role, content: impl Into<String>) -> Result<&Turn, TurnError> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(TurnError::InvalidArgument("turn content is empty".into()));
        }
        let turn = Turn::new(self.next_index(), role, content);
        self.append(turn)
    }

    /// Append a pre-built turn. Its index must be greater than the last one.
    pub fn append(&mut self, turn: Turn) -> Result<&Turn, TurnError> {
        if let Some(last) = self.turns.last() {
            if turn.index <= last.index {
                return Err(TurnError::InvalidArgument(format!(
                    "turn index {} does not follow {}",
                    turn.index, last.index
                )));
            }
        }
        self.updated_at = Utc::now();
        self.turns.push(turn);
        Ok(&self.turns[self.turns.len() - 1])
    }

    pub fn next_index(&self) -> u64 {
        self.turns.last().map_or(1, |t| t.index + 1)
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

impl Default for TurnLog {
    fn default() -> Self {
        Self::new()
    }
}
