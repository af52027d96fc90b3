//! The orchestrator: a bounded think → act → observe loop per user message.
//!
//! Each inbound message starts in [`AgentState::Thinking`]. The backend is
//! asked for one step at a time:
//!
//! - `think` is logged and the backend is asked again
//! - `action` runs a tool through the registry; its result is appended to
//!   the transcript as an observation and the backend is asked again
//! - `output` ends the loop
//! - anything else is taken as the final answer verbatim
//!
//! A failing backend call ends the loop in [`AgentState::Failed`]; tool
//! failures never do. After `max_iterations` round trips the loop stops
//! with a generic completion message.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use codeloop_config::AgentConfig;
use codeloop_core::error::ProviderError;
use codeloop_core::event::{DomainEvent, EventBus};
use codeloop_core::message::{Conversation, ConversationId};
use codeloop_core::provider::{ProviderRequest, ProviderResponse};
use codeloop_core::step::{Step, StepRecord};
use codeloop_core::tool::ToolRegistry;
use codeloop_providers::{Backend, BackendKind, BackendRouter};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::codec::{self, Decoded};
use crate::extractor::{self, CREATE_FILE_TOOL};
use crate::prompt;
use crate::transcripts::{InMemoryTranscripts, TranscriptStore};

/// Final answer when the iteration cap is hit without an `output` step.
pub const CAP_MESSAGE: &str =
    "I've completed the task. Please let me know if you need anything else!";

/// Loop settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Backend round trips allowed per user message
    pub max_iterations: u32,
    /// Wall-clock limit for a single backend call
    pub backend_timeout: Duration,
    /// Replaces the generated system instructions
    pub system_prompt: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: 8,
            backend_timeout: Duration::from_secs(60),
            system_prompt: None,
        }
    }
}

impl From<&AgentConfig> for OrchestratorConfig {
    fn from(config: &AgentConfig) -> Self {
        Self {
            max_iterations: config.max_iterations.max(1),
            backend_timeout: Duration::from_secs(config.backend_timeout_secs),
            system_prompt: config.system_prompt_override.clone(),
        }
    }
}

/// Where one message's loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Thinking,
    Acting,
    Observing,
    Done,
    Failed,
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Thinking => "thinking",
            Self::Acting => "acting",
            Self::Observing => "observing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// An inbound chat request as it arrives from a caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub conversation_id: Option<String>,

    /// `gpt4` (default) or `gemini`
    #[serde(default)]
    pub model: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_conversation(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// A finished loop.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub steps: Vec<StepRecord>,
    pub final_output: String,
    pub conversation_id: ConversationId,
    pub model: BackendKind,
}

/// Why a message could not be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The request was rejected before the loop started
    Validation,
    /// The selected backend is not configured
    BackendUnavailable,
    /// The backend call failed mid-loop
    Backend,
}

/// A failed message. `steps` holds whatever was logged before the failure.
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct ChatFailure {
    pub kind: FailureKind,
    pub message: String,
    pub steps: Vec<StepRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
}

impl ChatFailure {
    fn validation(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Validation,
            message: message.into(),
            steps: Vec::new(),
            conversation_id: None,
        }
    }

    fn unavailable(kind: BackendKind) -> Self {
        let vendor = match kind {
            BackendKind::Gpt4 => "OpenAI",
            BackendKind::Gemini => "Gemini",
        };
        Self {
            kind: FailureKind::BackendUnavailable,
            message: format!("{vendor} API key is not configured"),
            steps: Vec::new(),
            conversation_id: None,
        }
    }
}

/// Bookkeeping for one message's loop.
struct Run<'a> {
    conversation_id: &'a ConversationId,
    state: AgentState,
    steps: Vec<StepRecord>,
}

impl<'a> Run<'a> {
    fn new(conversation_id: &'a ConversationId) -> Self {
        Self {
            conversation_id,
            state: AgentState::Thinking,
            steps: Vec::new(),
        }
    }

    fn enter(&mut self, state: AgentState) {
        if self.state != state {
            debug!(conversation_id = %self.conversation_id, from = %self.state, to = %state, "State transition");
            self.state = state;
        }
    }

    fn record(&mut self, step: StepRecord) {
        self.steps.push(step);
    }

    fn finish(mut self, final_output: String, model: BackendKind) -> ChatReply {
        self.enter(AgentState::Done);
        self.record(StepRecord::output(final_output.clone()));
        ChatReply {
            steps: self.steps,
            final_output,
            conversation_id: self.conversation_id.clone(),
            model,
        }
    }

    fn fail(mut self, error: &ProviderError) -> ChatFailure {
        self.enter(AgentState::Failed);
        let message = error.to_string();
        self.record(StepRecord::error(format!("Error: {message}")));
        ChatFailure {
            kind: FailureKind::Backend,
            message,
            steps: self.steps,
            conversation_id: Some(self.conversation_id.clone()),
        }
    }
}

/// Drives conversations against the configured backends and tools.
pub struct Orchestrator {
    backends: BackendRouter,
    tools: Arc<ToolRegistry>,
    transcripts: Arc<dyn TranscriptStore>,
    events: Arc<EventBus>,
    config: OrchestratorConfig,
    system_prompt: String,
}

impl Orchestrator {
    /// Create an orchestrator with in-memory transcripts and default settings.
    pub fn new(backends: BackendRouter, tools: Arc<ToolRegistry>) -> Self {
        let system_prompt = prompt::system_prompt(&tools.definitions());
        Self {
            backends,
            tools,
            transcripts: Arc::new(InMemoryTranscripts::new()),
            events: Arc::new(EventBus::default()),
            config: OrchestratorConfig::default(),
            system_prompt,
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        if let Some(custom) = &config.system_prompt {
            self.system_prompt = custom.clone();
        }
        self.config = config;
        self
    }

    pub fn with_transcripts(mut self, transcripts: Arc<dyn TranscriptStore>) -> Self {
        self.transcripts = transcripts;
        self
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn backends(&self) -> &BackendRouter {
        &self.backends
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn transcripts(&self) -> &dyn TranscriptStore {
        self.transcripts.as_ref()
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Validate a raw request and run it.
    ///
    /// A missing or blank message and an unknown model are rejected before
    /// any transcript is touched. A missing conversation id gets a fresh one.
    pub async fn handle(&self, request: ChatRequest) -> Result<ChatReply, ChatFailure> {
        let message = request
            .message
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| ChatFailure::validation("Message is required"))?;

        let kind = match request.model.as_deref() {
            Some(model) => model
                .parse::<BackendKind>()
                .map_err(|e| ChatFailure::validation(e.to_string()))?,
            None => BackendKind::default(),
        };

        let conversation_id = request
            .conversation_id
            .filter(|id| !id.trim().is_empty())
            .map(ConversationId)
            .unwrap_or_default();

        self.handle_message(&conversation_id, &message, kind).await
    }

    /// Run the loop for one user message on one conversation.
    pub async fn handle_message(
        &self,
        conversation_id: &ConversationId,
        text: &str,
        kind: BackendKind,
    ) -> Result<ChatReply, ChatFailure> {
        if text.trim().is_empty() {
            return Err(ChatFailure::validation("Message is required"));
        }
        let backend = self
            .backends
            .get(kind)
            .ok_or_else(|| ChatFailure::unavailable(kind))?;

        let shared = self.transcripts.open(conversation_id, &self.system_prompt);
        let mut conversation = shared.lock().await;
        conversation.push_user(text);

        info!(conversation_id = %conversation_id, backend = %kind, max_iterations = self.config.max_iterations, "Handling message");

        let mut run = Run::new(conversation_id);

        for iteration in 1..=self.config.max_iterations {
            run.enter(AgentState::Thinking);
            debug!(conversation_id = %conversation_id, iteration, "Requesting next step");

            let response = match self.call_backend(kind, backend, &conversation).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(conversation_id = %conversation_id, iteration, error = %e, "Backend call failed");
                    self.events.publish(DomainEvent::ErrorOccurred {
                        context: format!("conversation {conversation_id}"),
                        error_message: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    return Err(run.fail(&e));
                }
            };

            let raw = response.content;
            conversation.push_assistant(raw.clone());

            match codec::decode(&raw) {
                Decoded::Step(Step::Think { content }) => {
                    run.record(StepRecord::think(content));
                }
                Decoded::Step(Step::Output { content }) => {
                    return Ok(run.finish(content, kind));
                }
                Decoded::Step(Step::Action { tool, input }) => {
                    run.enter(AgentState::Acting);
                    run.record(StepRecord::action(tool.clone(), input.clone()));

                    let outcome = self.tools.invoke(&tool, input).await;
                    self.events.publish(DomainEvent::ToolExecuted {
                        tool_name: tool.clone(),
                        success: outcome.success,
                        duration_ms: outcome.duration_ms,
                        timestamp: Utc::now(),
                    });

                    run.enter(AgentState::Observing);
                    conversation.push_assistant(codec::encode_observation(&outcome.output));
                    run.record(StepRecord::observe(outcome.output));
                }
                // The model does not get to write its own observations.
                Decoded::Step(Step::Observe { .. }) | Decoded::Fallback(_) => {
                    self.note_fallback(conversation_id, &raw);
                    if backend.extract_code_blocks {
                        self.extract_files(&mut run, &raw, text).await;
                    }
                    return Ok(run.finish(raw, kind));
                }
            }
        }

        warn!(conversation_id = %conversation_id, iterations = self.config.max_iterations, "Iteration cap reached");
        self.events.publish(DomainEvent::LoopCapReached {
            conversation_id: conversation_id.to_string(),
            iterations: self.config.max_iterations,
            timestamp: Utc::now(),
        });
        Ok(run.finish(CAP_MESSAGE.to_string(), kind))
    }

    async fn call_backend(
        &self,
        kind: BackendKind,
        backend: &Backend,
        conversation: &Conversation,
    ) -> Result<ProviderResponse, ProviderError> {
        let request = ProviderRequest {
            model: backend.model.clone(),
            messages: conversation.messages().to_vec(),
            temperature: backend.temperature,
            max_tokens: backend.max_tokens,
        };

        let start = Instant::now();
        let timeout = self.config.backend_timeout;
        let response = tokio::time::timeout(timeout, backend.provider.complete(request))
            .await
            .map_err(|_| {
                ProviderError::Timeout(format!("no response from {kind} after {}s", timeout.as_secs()))
            })??;

        self.events.publish(DomainEvent::ResponseGenerated {
            conversation_id: conversation.id.to_string(),
            backend: kind.to_string(),
            model: response.model.clone(),
            tokens_used: response.usage.as_ref().map(|u| u.total_tokens),
            duration_ms: start.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        });
        Ok(response)
    }

    fn note_fallback(&self, conversation_id: &ConversationId, raw: &str) {
        let preview: String = raw.chars().take(120).collect();
        warn!(target: "codeloop::protocol", conversation_id = %conversation_id, preview = %preview, "Reply is not a step; using it as the final answer");
        self.events.publish(DomainEvent::ProtocolFallback {
            conversation_id: conversation_id.to_string(),
            raw_preview: preview,
            timestamp: Utc::now(),
        });
    }

    async fn extract_files(&self, run: &mut Run<'_>, raw: &str, request: &str) {
        let files = extractor::extract(&self.tools, raw, request).await;
        if !files.is_empty() {
            info!(count = files.len(), "Materialized code blocks as files");
        }
        for file in files {
            run.enter(AgentState::Acting);
            run.record(StepRecord::action(CREATE_FILE_TOOL, file.input));
            self.events.publish(DomainEvent::ToolExecuted {
                tool_name: CREATE_FILE_TOOL.to_string(),
                success: file.success,
                duration_ms: file.duration_ms,
                timestamp: Utc::now(),
            });
            run.enter(AgentState::Observing);
            run.record(StepRecord::observe(file.outcome));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedProvider, action, output, think};
    use crate::transcripts::EphemeralTranscripts;
    use codeloop_core::message::Role;
    use codeloop_core::step::StepKind;
    use codeloop_files::VirtualFileStore;

    struct Fixture {
        orchestrator: Orchestrator,
        provider: Arc<ScriptedProvider>,
        store: Arc<VirtualFileStore>,
    }

    fn fixture(provider: ScriptedProvider) -> Fixture {
        fixture_with(provider, false)
    }

    fn fixture_with(provider: ScriptedProvider, extract_code_blocks: bool) -> Fixture {
        let provider = Arc::new(provider);
        let store = Arc::new(VirtualFileStore::new());
        let tools = Arc::new(codeloop_tools::default_registry(store.clone()));
        let backend = Backend::new(provider.clone(), "scripted-model")
            .with_extract_code_blocks(extract_code_blocks);
        let router = BackendRouter::new().with(BackendKind::Gpt4, backend);
        Fixture {
            orchestrator: Orchestrator::new(router, tools),
            provider,
            store,
        }
    }

    fn kinds(steps: &[StepRecord]) -> Vec<StepKind> {
        steps.iter().map(|s| s.kind).collect()
    }

    fn cid(id: &str) -> ConversationId {
        ConversationId::from(id)
    }

    #[tokio::test]
    async fn output_step_finishes() {
        let f = fixture(ScriptedProvider::new([output("Hello!")]));
        let reply = f
            .orchestrator
            .handle_message(&cid("c1"), "hi", BackendKind::Gpt4)
            .await
            .unwrap();

        assert_eq!(reply.final_output, "Hello!");
        assert_eq!(kinds(&reply.steps), vec![StepKind::Output]);
        assert_eq!(reply.model, BackendKind::Gpt4);
        assert_eq!(f.provider.call_count(), 1);
    }

    #[tokio::test]
    async fn action_observe_cycle_writes_file() {
        let f = fixture(ScriptedProvider::new([
            action("createFile", serde_json::json!({"fileName": "a.txt", "content": "hi"})),
            output("done"),
        ]));

        let reply = f
            .orchestrator
            .handle_message(&cid("c1"), "make a.txt", BackendKind::Gpt4)
            .await
            .unwrap();

        assert_eq!(
            kinds(&reply.steps),
            vec![StepKind::Action, StepKind::Observe, StepKind::Output]
        );
        assert_eq!(reply.steps[0].tool.as_deref(), Some("createFile"));
        assert!(reply.steps[1].content.contains("created successfully"));
        assert_eq!(reply.steps[2].content, "done");
        assert_eq!(reply.final_output, "done");
        assert_eq!(f.store.get("a.txt").unwrap().content(), "hi");
    }

    #[tokio::test]
    async fn observation_is_fed_back_as_assistant_turn() {
        let f = fixture(ScriptedProvider::new([
            action("getWeatherInfo", serde_json::json!("Paris")),
            output("nice"),
        ]));
        f.orchestrator
            .handle_message(&cid("c1"), "weather?", BackendKind::Gpt4)
            .await
            .unwrap();

        let requests = f.provider.requests();
        assert_eq!(requests.len(), 2);
        let second = &requests[1].messages;
        let last = second.last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        match codec::decode(&last.content) {
            Decoded::Step(Step::Observe { content }) => assert!(content.contains("Paris")),
            other => panic!("expected observe turn, got {other:?}"),
        }
        assert_eq!(requests[0].model, "scripted-model");
    }

    #[tokio::test]
    async fn always_thinking_stops_at_cap() {
        let f = fixture(ScriptedProvider::repeating(think("still pondering")));
        let orchestrator = f.orchestrator.with_config(OrchestratorConfig {
            max_iterations: 3,
            ..OrchestratorConfig::default()
        });

        let reply = orchestrator
            .handle_message(&cid("c1"), "loop forever", BackendKind::Gpt4)
            .await
            .unwrap();

        assert_eq!(reply.final_output, CAP_MESSAGE);
        assert!(!reply.final_output.is_empty());
        assert_eq!(f.provider.call_count(), 3);
        assert_eq!(
            kinds(&reply.steps),
            vec![StepKind::Think, StepKind::Think, StepKind::Think, StepKind::Output]
        );
    }

    #[tokio::test]
    async fn malformed_output_is_final_answer_verbatim() {
        let f = fixture(ScriptedProvider::new(["just talking, not JSON"]));
        let reply = f
            .orchestrator
            .handle_message(&cid("c1"), "hi", BackendKind::Gpt4)
            .await
            .unwrap();
        assert_eq!(reply.final_output, "just talking, not JSON");
        assert_eq!(kinds(&reply.steps), vec![StepKind::Output]);
    }

    #[tokio::test]
    async fn fallback_is_observable() {
        let f = fixture(ScriptedProvider::new(["plain prose"]));
        let mut rx = f.orchestrator.events().subscribe();

        f.orchestrator
            .handle_message(&cid("c9"), "hi", BackendKind::Gpt4)
            .await
            .unwrap();

        let mut saw_fallback = false;
        while let Ok(event) = rx.try_recv() {
            if let DomainEvent::ProtocolFallback { conversation_id, raw_preview, .. } = event.as_ref() {
                assert_eq!(conversation_id, "c9");
                assert_eq!(raw_preview, "plain prose");
                saw_fallback = true;
            }
        }
        assert!(saw_fallback);
    }

    #[tokio::test]
    async fn model_written_observe_is_treated_as_prose() {
        let raw = r#"{"step":"observe","content":"I pretend a tool ran"}"#;
        let f = fixture(ScriptedProvider::new([raw]));
        let reply = f
            .orchestrator
            .handle_message(&cid("c1"), "hi", BackendKind::Gpt4)
            .await
            .unwrap();
        assert_eq!(reply.final_output, raw);
        assert_eq!(f.provider.call_count(), 1);
    }

    #[tokio::test]
    async fn tool_failure_does_not_abort() {
        let f = fixture(ScriptedProvider::new([
            action("launchRocket", serde_json::json!("now")),
            action("createFile", serde_json::json!({"fileName": "../x", "content": "x"})),
            output("gave up"),
        ]));

        let reply = f
            .orchestrator
            .handle_message(&cid("c1"), "go", BackendKind::Gpt4)
            .await
            .unwrap();

        assert_eq!(reply.final_output, "gave up");
        assert_eq!(reply.steps[1].content, "Error: Tool not found: launchRocket");
        assert!(reply.steps[3].content.starts_with("Error: "));
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn backend_failure_keeps_partial_log() {
        let f = fixture(ScriptedProvider::from_results([
            Ok(think("first")),
            Err(ProviderError::Network("connection reset".into())),
        ]));

        let failure = f
            .orchestrator
            .handle_message(&cid("c1"), "hi", BackendKind::Gpt4)
            .await
            .unwrap_err();

        assert_eq!(failure.kind, FailureKind::Backend);
        assert!(failure.message.contains("connection reset"));
        assert_eq!(kinds(&failure.steps), vec![StepKind::Think, StepKind::Error]);
        assert!(failure.steps[1].content.starts_with("Error: "));
        assert_eq!(failure.conversation_id, Some(cid("c1")));
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let f = fixture(ScriptedProvider::new([output("late")]).with_delay(Duration::from_millis(200)));
        let orchestrator = f.orchestrator.with_config(OrchestratorConfig {
            backend_timeout: Duration::from_millis(20),
            ..OrchestratorConfig::default()
        });

        let failure = orchestrator
            .handle_message(&cid("c1"), "hi", BackendKind::Gpt4)
            .await
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::Backend);
        assert!(failure.message.contains("timed out"));
    }

    #[tokio::test]
    async fn validation_happens_before_transcript_mutation() {
        let f = fixture(ScriptedProvider::new([output("unused")]));

        let missing = f.orchestrator.handle(ChatRequest::default()).await.unwrap_err();
        assert_eq!(missing.kind, FailureKind::Validation);
        assert_eq!(missing.message, "Message is required");

        let unknown = f
            .orchestrator
            .handle(ChatRequest::new("hi").with_model("claude"))
            .await
            .unwrap_err();
        assert_eq!(unknown.kind, FailureKind::Validation);

        let unavailable = f
            .orchestrator
            .handle(ChatRequest::new("hi").with_model("gemini").with_conversation("c1"))
            .await
            .unwrap_err();
        assert_eq!(unavailable.kind, FailureKind::BackendUnavailable);
        assert_eq!(unavailable.message, "Gemini API key is not configured");

        assert!(f.orchestrator.transcripts().is_empty());
        assert_eq!(f.provider.call_count(), 0);
    }

    #[tokio::test]
    async fn missing_conversation_id_gets_one() {
        let f = fixture(ScriptedProvider::new([output("ok")]));
        let reply = f.orchestrator.handle(ChatRequest::new("hi")).await.unwrap();
        assert!(!reply.conversation_id.as_str().is_empty());
        assert!(f.orchestrator.transcripts().snapshot(&reply.conversation_id).is_some());
    }

    #[tokio::test]
    async fn transcript_persists_across_messages() {
        let f = fixture(ScriptedProvider::new([output("one"), output("two")]));
        let id = cid("c1");

        f.orchestrator.handle_message(&id, "first", BackendKind::Gpt4).await.unwrap();
        f.orchestrator.handle_message(&id, "second", BackendKind::Gpt4).await.unwrap();

        let conversation = f.orchestrator.transcripts().snapshot(&id).unwrap();
        let roles: Vec<Role> = conversation.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
        assert_eq!(
            conversation.messages().iter().filter(|m| m.role == Role::System).count(),
            1
        );
        assert_eq!(f.provider.requests()[1].messages.len(), 4);
    }

    #[tokio::test]
    async fn ephemeral_transcripts_forget() {
        let f = fixture(ScriptedProvider::new([output("one"), output("two")]));
        let orchestrator = f
            .orchestrator
            .with_transcripts(Arc::new(EphemeralTranscripts));
        let id = cid("c1");

        orchestrator.handle_message(&id, "first", BackendKind::Gpt4).await.unwrap();
        orchestrator.handle_message(&id, "second", BackendKind::Gpt4).await.unwrap();

        // system + user
        assert_eq!(f.provider.requests()[1].messages.len(), 2);
    }

    #[tokio::test]
    async fn prose_with_code_is_extracted_when_enabled() {
        let reply_text = "Here is your app:\n```html\n<h1>Todo</h1>\n```\n```css\nh1 { color: red; }\n```";
        let f = fixture_with(ScriptedProvider::new([reply_text]), true);
        let mut events = f.orchestrator.events().subscribe();

        let reply = f
            .orchestrator
            .handle_message(&cid("c1"), "build a todo app", BackendKind::Gpt4)
            .await
            .unwrap();

        assert_eq!(
            kinds(&reply.steps),
            vec![
                StepKind::Action,
                StepKind::Observe,
                StepKind::Action,
                StepKind::Observe,
                StepKind::Output
            ]
        );
        assert_eq!(reply.final_output, reply_text);
        assert_eq!(f.store.get("todo.html").unwrap().content(), "<h1>Todo</h1>");
        assert!(f.store.contains("todo.css"));

        // Extracted writes are logged like model-initiated actions.
        assert_eq!(reply.steps[0].tool.as_deref(), Some("createFile"));
        assert_eq!(
            reply.steps[0].input,
            Some(serde_json::json!({"fileName": "todo.html", "content": "<h1>Todo</h1>"}))
        );
        let mut executed = 0;
        while let Ok(event) = events.try_recv() {
            if let DomainEvent::ToolExecuted { tool_name, success, .. } = event.as_ref() {
                assert_eq!(tool_name, "createFile");
                assert!(*success);
                executed += 1;
            }
        }
        assert_eq!(executed, 2);
    }

    #[tokio::test]
    async fn prose_with_code_is_left_alone_when_disabled() {
        let f = fixture(ScriptedProvider::new(["```html\n<h1>Todo</h1>\n```"]));
        f.orchestrator
            .handle_message(&cid("c1"), "build a todo app", BackendKind::Gpt4)
            .await
            .unwrap();
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn system_prompt_override() {
        let f = fixture(ScriptedProvider::new([output("ok")]));
        let orchestrator = f.orchestrator.with_config(OrchestratorConfig {
            system_prompt: Some("be terse".into()),
            ..OrchestratorConfig::default()
        });
        orchestrator.handle_message(&cid("c1"), "hi", BackendKind::Gpt4).await.unwrap();

        let first = &f.provider.requests()[0].messages[0];
        assert_eq!(first.role, Role::System);
        assert_eq!(first.content, "be terse");
    }

    #[test]
    fn generated_prompt_lists_registered_tools() {
        let f = fixture(ScriptedProvider::new(Vec::<String>::new()));
        let prompt = f.orchestrator.system_prompt();
        for name in ["createFile", "executeCommand", "getWeatherInfo"] {
            assert!(prompt.contains(name), "{name} missing");
        }
    }

    #[test]
    fn reply_serializes_camel_case() {
        let reply = ChatReply {
            steps: vec![StepRecord::output("hi")],
            final_output: "hi".into(),
            conversation_id: cid("c1"),
            model: BackendKind::Gemini,
        };
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["finalOutput"], "hi");
        assert_eq!(json["conversationId"], "c1");
        assert_eq!(json["model"], "gemini");
        assert_eq!(json["steps"][0]["type"], "output");
    }

    #[tokio::test]
    async fn concurrent_messages_on_one_conversation_serialize() {
        let f = fixture(
            ScriptedProvider::new([output("a"), output("b")]).with_delay(Duration::from_millis(10)),
        );
        let orchestrator = Arc::new(f.orchestrator);
        let id = cid("shared");

        let (a, b) = tokio::join!(
            orchestrator.handle_message(&id, "one", BackendKind::Gpt4),
            orchestrator.handle_message(&id, "two", BackendKind::Gpt4),
        );
        assert!(a.is_ok() && b.is_ok());

        let conversation = orchestrator.transcripts().snapshot(&id).unwrap();
        let roles: Vec<Role> = conversation.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
    }
}
