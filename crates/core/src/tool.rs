//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools are what let the agent act: write files into the virtual store,
//! run (or simulate) commands, look up the weather. The registry is the
//! single dispatch point; it never lets a tool failure escape as an error.

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tracing::{debug, warn};
use crate::error::ToolError;

/// Prefix that marks a failure result so it is distinguishable from success text.
pub const FAILURE_PREFIX: &str = "Error: ";

/// Declared side effects of a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolEffect {
    /// No side effects
    Pure,
    /// Mutates the virtual file store
    FileMutating,
    /// Reaches outside the process
    ExternalCall,
}

/// A tool description, rendered into the system instructions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
    pub effect: ToolEffect,
}

/// The core Tool trait.
///
/// Each built-in capability implements this trait and is registered once
/// at startup in the [`ToolRegistry`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "createFile").
    fn name(&self) -> &str;

    /// A description of what this tool does (shown to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's input.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Side effects, by convention.
    fn effect(&self) -> ToolEffect;

    /// Execute the tool and return its result text.
    async fn execute(&self, input: serde_json::Value) -> std::result::Result<String, ToolError>;

    /// Convert this tool into a ToolDefinition.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
            effect: self.effect(),
        }
    }
}

/// The outcome of a registry invocation. Always present, success or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// The tool name as requested
    pub tool: String,

    /// Whether the tool returned a result
    pub success: bool,

    /// Result text, or a failure message starting with [`FAILURE_PREFIX`]
    pub output: String,

    pub duration_ms: u64,
}

/// A registry of available tools.
///
/// The orchestrator and the code-block extractor use it to:
/// 1. Look up tools by name (exact, then ASCII case-insensitive)
/// 2. Invoke them with failures converted into text outcomes
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Resolve a tool by name.
    ///
    /// Models often lower-case tool names (`getweatherinfo`), so an exact
    /// miss falls back to a case-insensitive match.
    pub fn resolve(&self, name: &str) -> Option<&dyn Tool> {
        if let Some(tool) = self.tools.get(name) {
            return Some(tool.as_ref());
        }
        self.tools
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, tool)| tool.as_ref())
    }

    /// Get all tool definitions, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Invoke a tool by name.
    ///
    /// Unknown names, tool errors and panics inside a tool all become a
    /// failure outcome whose text starts with [`FAILURE_PREFIX`].
    pub async fn invoke(&self, name: &str, input: serde_json::Value) -> ToolOutcome {
        let start = Instant::now();

        let result = match self.resolve(name) {
            Some(tool) => {
                debug!(tool = %tool.name(), "Invoking tool");
                AssertUnwindSafe(tool.execute(input))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|payload| Err(ToolError::Panicked(panic_message(payload.as_ref()))))
            }
            None => Err(ToolError::NotFound(name.to_string())),
        };

        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(output) => ToolOutcome {
                tool: name.to_string(),
                success: true,
                output,
                duration_ms,
            },
            Err(e) => {
                warn!(tool = %name, error = %e, "Tool invocation failed");
                ToolOutcome {
                    tool: name.to_string(),
                    success: false,
                    output: format!("{FAILURE_PREFIX}{e}"),
                    duration_ms,
                }
            }
        }
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
