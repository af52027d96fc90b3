//! The codeloop agent loop.
//!
//! The orchestrator follows a **think → act → observe** cycle:
//!
//! 1. **Receive** a user message for a conversation
//! 2. **Ask the backend** for exactly one step, replaying the transcript
//! 3. **If action**: run the tool, append the observation, go back to 2
//! 4. **If output**: return the answer with the ordered step log
//!
//! Replies that are not a step become the final answer verbatim. For
//! backends that answer in prose, fenced code in such replies can be
//! written out as files.

pub mod codec;
pub mod extractor;
pub mod orchestrator;
pub mod prompt;
#[cfg(any(test, feature = "test-util"))]
pub mod test_helpers;
pub mod transcripts;

pub use codec::{Decoded, decode, encode_observation};
pub use extractor::{ExtractedFile, extract};
pub use orchestrator::{
    AgentState, CAP_MESSAGE, ChatFailure, ChatReply, ChatRequest, FailureKind, Orchestrator,
    OrchestratorConfig,
};
pub use prompt::system_prompt;
pub use transcripts::{EphemeralTranscripts, InMemoryTranscripts, SharedConversation, TranscriptStore};
