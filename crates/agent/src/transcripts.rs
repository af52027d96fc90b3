//! Transcript persistence strategies.
//!
//! [`InMemoryTranscripts`] resumes a conversation by id for the life of the
//! process. [`EphemeralTranscripts`] starts every message from a fresh
//! transcript. Either way the orchestrator holds the returned lock for the
//! whole loop, so two messages on one conversation never interleave.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use codeloop_core::message::{Conversation, ConversationId};
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

/// A transcript shared between the store and the running loop.
pub type SharedConversation = Arc<AsyncMutex<Conversation>>;

/// Where transcripts live between messages.
pub trait TranscriptStore: Send + Sync {
    /// Get the transcript for `id`, creating it with `system_prompt` as its
    /// only turn when it does not exist yet.
    fn open(&self, id: &ConversationId, system_prompt: &str) -> SharedConversation;

    /// Snapshot a stored transcript.
    fn snapshot(&self, id: &ConversationId) -> Option<Conversation>;

    /// Number of stored transcripts.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keeps every conversation in memory, keyed by id.
#[derive(Default)]
pub struct InMemoryTranscripts {
    conversations: Mutex<HashMap<ConversationId, SharedConversation>>,
}

impl InMemoryTranscripts {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TranscriptStore for InMemoryTranscripts {
    fn open(&self, id: &ConversationId, system_prompt: &str) -> SharedConversation {
        let mut conversations = self.conversations.lock().unwrap_or_else(|e| e.into_inner());
        conversations
            .entry(id.clone())
            .or_insert_with(|| {
                debug!(conversation_id = %id, "Starting conversation");
                Arc::new(AsyncMutex::new(Conversation::new(id.clone(), system_prompt)))
            })
            .clone()
    }

    fn snapshot(&self, id: &ConversationId) -> Option<Conversation> {
        let shared = {
            let conversations = self.conversations.lock().unwrap_or_else(|e| e.into_inner());
            conversations.get(id).cloned()
        }?;
        // A loop holding the lock means the transcript is mid-update.
        shared.try_lock().ok().map(|conversation| conversation.clone())
    }

    fn len(&self) -> usize {
        self.conversations.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Never remembers anything: each message gets a new transcript.
#[derive(Debug, Default, Clone, Copy)]
pub struct EphemeralTranscripts;

impl TranscriptStore for EphemeralTranscripts {
    fn open(&self, id: &ConversationId, system_prompt: &str) -> SharedConversation {
        Arc::new(AsyncMutex::new(Conversation::new(id.clone(), system_prompt)))
    }

    fn snapshot(&self, _id: &ConversationId) -> Option<Conversation> {
        None
    }

    fn len(&self) -> usize {
        0
    }
}
