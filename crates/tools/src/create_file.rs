//! `createFile`: write into the virtual file store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use codeloop_core::error::ToolError;
use codeloop_core::event::{DomainEvent, EventBus, FileChange};
use codeloop_core::tool::{Tool, ToolEffect};
use codeloop_files::{VirtualFileStore, WriteKind};
use tracing::info;

use crate::CREATE_FILE;

pub struct CreateFileTool {
    store: Arc<VirtualFileStore>,
    events: Option<Arc<EventBus>>,
}

impl CreateFileTool {
    pub fn new(store: Arc<VirtualFileStore>) -> Self {
        Self { store, events: None }
    }

    /// Publish a `FileChanged` event after each successful write.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }
}

/// Models sometimes send the object as a JSON-encoded string.
fn object_input(input: serde_json::Value) -> Result<serde_json::Map<String, serde_json::Value>, ToolError> {
    let value = match input {
        serde_json::Value::String(s) => serde_json::from_str(&s).map_err(|_| {
            ToolError::InvalidArguments("Expected an object with 'fileName' and 'content'".into())
        })?,
        other => other,
    };

    match value {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err(ToolError::InvalidArguments(
            "Expected an object with 'fileName' and 'content'".into(),
        )),
    }
}

#[async_trait]
impl Tool for CreateFileTool {
    fn name(&self) -> &str {
        CREATE_FILE
    }

    fn description(&self) -> &str {
        "Creates or overwrites a file in the project workspace."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "fileName": {
                    "type": "string",
                    "description": "Relative path of the file, e.g. src/App.jsx"
                },
                "content": {
                    "type": "string",
                    "description": "Full file content"
                }
            },
            "required": ["fileName", "content"]
        })
    }

    fn effect(&self) -> ToolEffect {
        ToolEffect::FileMutating
    }

    async fn execute(&self, input: serde_json::Value) -> Result<String, ToolError> {
        let args = object_input(input)?;

        let file_name = args
            .get("fileName")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'fileName' argument".into()))?;

        let content = match args.get("content") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Null) | None => {
                return Err(ToolError::InvalidArguments("Missing 'content' argument".into()));
            }
            Some(other) => serde_json::to_string_pretty(other)
                .map_err(|e| ToolError::InvalidArguments(e.to_string()))?,
        };

        let outcome = self
            .store
            .write(file_name, content)
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: CREATE_FILE.into(),
                reason: e.to_string(),
            })?;

        let path = outcome.record.path().to_string();
        let size = outcome.record.size();
        let (verb, change) = match outcome.kind {
            WriteKind::Created => ("created", FileChange::Created),
            WriteKind::Updated => ("updated", FileChange::Updated),
        };

        info!(path = %path, size, verb, "File written");
        if let Some(events) = &self.events {
            events.publish(DomainEvent::FileChanged {
                path: path.clone(),
                change,
                timestamp: Utc::now(),
            });
        }

        Ok(format!("File '{path}' {verb} successfully with {size} characters."))
    }
}
