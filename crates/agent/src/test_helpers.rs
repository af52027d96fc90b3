//! Scripted backends for tests.
//!
//! Public so integration tests in other crates can drive the orchestrator
//! without a network.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use codeloop_core::error::ProviderError;
use codeloop_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};

/// A provider that replays a script of replies.
///
/// Each call to `complete` pops the next entry. When the script runs out the
/// last entry repeats if `repeat_last` is set, otherwise the call fails with
/// `ProviderError::EmptyResponse`.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    last: Mutex<Option<Result<String, ProviderError>>>,
    repeat_last: bool,
    delay: Option<Duration>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_results(replies.into_iter().map(|r| Ok(r.into())))
    }

    pub fn from_results(script: impl IntoIterator<Item = Result<String, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            last: Mutex::new(None),
            repeat_last: false,
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider that gives the same reply forever.
    pub fn repeating(reply: impl Into<String>) -> Self {
        let mut provider = Self::new([reply.into()]);
        provider.repeat_last = true;
        provider
    }

    /// A provider whose every call fails with `error`.
    pub fn failing(error: ProviderError) -> Self {
        let mut provider = Self::from_results([Err(error)]);
        provider.repeat_last = true;
        provider
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `complete` calls so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn next_reply(&self) -> Result<String, ProviderError> {
        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());

        match script.pop_front() {
            Some(reply) => {
                *last = Some(reply.clone());
                reply
            }
            None => match (&*last, self.repeat_last) {
                (Some(reply), true) => reply.clone(),
                _ => Err(ProviderError::EmptyResponse("script exhausted".into())),
            },
        }
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let content = self.next_reply()?;
        Ok(ProviderResponse {
            content,
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model,
        })
    }
}

/// JSON for a `think` step.
pub fn think(content: &str) -> String {
    serde_json::json!({ "step": "think", "content": content }).to_string()
}

/// JSON for an `action` step.
pub fn action(tool: &str, input: serde_json::Value) -> String {
    serde_json::json!({ "step": "action", "tool": tool, "input": input }).to_string()
}

/// JSON for an `output` step.
pub fn output(content: &str) -> String {
    serde_json::json!({ "step": "output", "content": content }).to_string()
}
