//! In-process fact store — one per conversation.

use chrono::Utc;
use contextual_core::error::FactError;
use contextual_core::fact::{Fact, normalize_key};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct FactTable {
    /// Facts in first-insertion order
    facts: Vec<Fact>,
    /// key → position in `facts`
    positions: HashMap<String, usize>,
}

/// Key/value facts for a single conversation.
///
/// Keys are unique. Overwriting a key keeps its original position so
/// `get_all` stays in insertion order. Cloning shares the same table.
#[derive(Clone, Default)]
pub struct FactStore {
    table: Arc<RwLock<FactTable>>,
}

impl FactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a fact, touching its timestamp.
    ///
    /// Returns `true` when the key was not present before.
    pub async fn upsert(&self, key: &str, value: impl Into<String>) -> Result<bool, FactError> {
        let key = normalize_key(key)?;
        let value = value.into();
        let mut table = self.table.write().await;

        if let Some(&pos) = table.positions.get(&key) {
            let fact = &mut table.facts[pos];
            fact.value = value;
            fact.updated_at = Utc::now();
            debug!(key = %key, "Fact overwritten");
            return Ok(false);
        }

        let pos = table.facts.len();
        table.facts.push(Fact {
            key: key.clone(),
            value,
            updated_at: Utc::now(),
        });
        table.positions.insert(key, pos);
        Ok(true)
    }

    /// Upsert a batch of extracted pairs, skipping invalid keys.
    ///
    /// Returns the number of pairs applied.
    pub async fn upsert_many<I, K, V>(&self, pairs: I) -> usize
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut applied = 0;
        for (key, value) in pairs {
            match self.upsert(key.as_ref(), value).await {
                Ok(_) => applied += 1,
                Err(e) => warn!("Skipping extracted fact: {e}"),
            }
        }
        applied
    }

    pub async fn get(&self, key: &str) -> Option<Fact> {
        let table = self.table.read().await;
        let pos = *table.positions.get(key.trim())?;
        table.facts.get(pos).cloned()
    }

    /// All facts in insertion order.
    pub async fn get_all(&self) -> Vec<Fact> {
        self.table.read().await.facts.clone()
    }

    /// Stable copy of the current facts, taken under a single read lock.
    pub async fn snapshot(&self) -> Vec<Fact> {
        self.get_all().await
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.facts.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove every fact. Only used on conversation teardown.
    pub async fn clear(&self) {
        let mut table = self.table.write().await;
        table.facts.clear();
        table.positions.clear();
    }
}
