//! Steps: the discriminated unit of one model turn.
//!
//! On the wire a step is a JSON object keyed by `step`:
//!
//! ```json
//! {"step":"think","content":"..."}
//! {"step":"action","tool":"createFile","input":{"fileName":"a.txt","content":"hi"}}
//! {"step":"observe","content":"..."}
//! {"step":"output","content":"..."}
//! ```

use serde::{Deserialize, Serialize};

/// One parsed model turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "lowercase")]
pub enum Step {
    /// Intermediate reasoning; the loop asks the model again.
    Think { content: String },

    /// A tool call. `input` is either a scalar or a structured record.
    Action {
        tool: String,
        input: serde_json::Value,
    },

    /// A tool result fed back to the model.
    Observe { content: String },

    /// The final answer.
    Output { content: String },
}

impl Step {
    pub fn kind(&self) -> StepKind {
        match self {
            Step::Think { .. } => StepKind::Think,
            Step::Action { .. } => StepKind::Action,
            Step::Observe { .. } => StepKind::Observe,
            Step::Output { .. } => StepKind::Output,
        }
    }
}

/// The kinds of entries in a step log. `Error` never comes from the model;
/// the orchestrator records it when a backend call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Think,
    Action,
    Observe,
    Output,
    Error,
}

/// An entry in the ordered step log returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    #[serde(rename = "type")]
    pub kind: StepKind,

    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
}

impl StepRecord {
    fn plain(kind: StepKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            tool: None,
            input: None,
        }
    }

    pub fn think(content: impl Into<String>) -> Self {
        Self::plain(StepKind::Think, content)
    }

    pub fn action(tool: impl Into<String>, input: serde_json::Value) -> Self {
        let tool = tool.into();
        Self {
            kind: StepKind::Action,
            content: format!("Executing {tool}"),
            tool: Some(tool),
            input: Some(input),
        }
    }

    pub fn observe(content: impl Into<String>) -> Self {
        Self::plain(StepKind::Observe, content)
    }

    pub fn output(content: impl Into<String>) -> Self {
        Self::plain(StepKind::Output, content)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::plain(StepKind::Error, content)
    }
}
