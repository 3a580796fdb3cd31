//! Domain event system — decoupled observation of conversation activity.
//!
//! Sessions publish events when turns are appended, context is assembled,
//! or background maintenance finishes. Subscribers (CLI, tests, metrics
//! sinks) react without coupling to the session internals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A turn was appended to a conversation
    TurnAppended {
        conversation_id: String,
        index: u64,
        timestamp: DateTime<Utc>,
    },

    /// A context was assembled for a query turn
    ContextAssembled {
        conversation_id: String,
        query_index: u64,
        total_tokens: usize,
        over_budget: bool,
        timestamp: DateTime<Utc>,
    },

    /// A summary chunk was stored in the memory store
    ChunkStored {
        conversation_id: String,
        first: u64,
        last: u64,
        timestamp: DateTime<Utc>,
    },

    /// Extracted facts were upserted
    FactsUpdated {
        conversation_id: String,
        count: usize,
        timestamp: DateTime<Utc>,
    },

    /// A maintenance job failed (will be retried on the next trigger)
    MaintenanceFailed {
        conversation_id: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// The conversation was torn down
    ConversationClosed {
        conversation_id: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
