//! Durable key/value facts extracted from a conversation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FactError;

/// A single fact, e.g. `project = "assistant-X"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    /// Unique key within a conversation
    pub key: String,

    /// Current value
    pub value: String,

    /// Last time this fact was written
    pub updated_at: DateTime<Utc>,
}

impl Fact {
    /// Build a fact, normalizing the key. Empty keys are rejected.
    pub fn new(key: &str, value: impl Into<String>) -> Result<Self, FactError> {
        Ok(Self {
            key: normalize_key(key)?,
            value: value.into(),
            updated_at: Utc::now(),
        })
    }
}

/// Trim a fact key and reject it when nothing is left.
pub fn normalize_key(key: &str) -> Result<String, FactError> {
    let key = key.trim();
    if key.is_empty() {
        return Err(FactError::InvalidArgument("fact key must not be empty".into()));
    }
    Ok(key.to_string())
}
