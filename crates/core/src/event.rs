//! Domain event system: decoupled observation of the agent loop.
//!
//! Events are published when something interesting happens (a backend round
//! trip, a tool call, a protocol fallback, a file change). Tests and
//! collaborators subscribe to watch the loop without hooking into it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// How a file in the virtual store changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileChange {
    Created,
    Updated,
    Deleted,
}

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A backend returned the next assistant message
    ResponseGenerated {
        conversation_id: String,
        backend: String,
        model: String,
        tokens_used: Option<u32>,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A tool was invoked through the registry
    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Model text did not parse as a step and was treated as the final answer
    ProtocolFallback {
        conversation_id: String,
        raw_preview: String,
        timestamp: DateTime<Utc>,
    },

    /// A file in the virtual store changed
    FileChanged {
        path: String,
        change: FileChange,
        timestamp: DateTime<Utc>,
    },

    /// The loop hit its iteration cap without an output step
    LoopCapReached {
        conversation_id: String,
        iterations: u32,
        timestamp: DateTime<Utc>,
    },

    /// A terminal error occurred
    ErrorOccurred {
        context: String,
        error_message: String,
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
