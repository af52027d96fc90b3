//! Command tool: run a command through a pluggable runner.
//!
//! [`SimulatedRunner`] is the default and never touches the host.
//! [`HostRunner`] spawns a real shell and must be chosen explicitly; it
//! enforces an allowlist and a timeout.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use codeloop_core::error::ToolError;
use codeloop_core::tool::{Tool, ToolEffect};
use codeloop_files::VirtualFileStore;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::{EXECUTE_COMMAND, scalar_input};

/// Something that can answer a command line.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Short label for logs ("simulated", "host").
    fn mode(&self) -> &str;

    async fn run(&self, command: &str) -> Result<String, ToolError>;
}

/// The `executeCommand` tool.
pub struct CommandTool {
    runner: Arc<dyn CommandRunner>,
}

impl CommandTool {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Tool for CommandTool {
    fn name(&self) -> &str {
        EXECUTE_COMMAND
    }

    fn description(&self) -> &str {
        "Runs a command and returns its output."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The command line to run"
                }
            },
            "required": ["command"]
        })
    }

    fn effect(&self) -> ToolEffect {
        ToolEffect::ExternalCall
    }

    async fn execute(&self, input: serde_json::Value) -> Result<String, ToolError> {
        let command = scalar_input(&input, "command")
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'command' argument".into()))?;

        debug!(command = %command, mode = %self.runner.mode(), "Running command");
        self.runner.run(&command).await
    }
}

fn base_command(command: &str) -> &str {
    command.split_whitespace().next().unwrap_or("")
}

// --- Simulated ---

/// Answers commands without executing anything.
///
/// With a store attached, `ls`/`dir` list the virtual files and `cat`
/// prints one of them.
#[derive(Default)]
pub struct SimulatedRunner {
    store: Option<Arc<VirtualFileStore>>,
}

impl SimulatedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(mut self, store: Arc<VirtualFileStore>) -> Self {
        self.store = Some(store);
        self
    }

    fn listing(&self) -> String {
        match &self.store {
            Some(store) if !store.is_empty() => store
                .list()
                .iter()
                .map(|r| r.path().to_string())
                .collect::<Vec<_>>()
                .join("  "),
            Some(_) => String::new(),
            None => "src/  public/  package.json  README.md  node_modules/".into(),
        }
    }
}

#[async_trait]
impl CommandRunner for SimulatedRunner {
    fn mode(&self) -> &str {
        "simulated"
    }

    async fn run(&self, command: &str) -> Result<String, ToolError> {
        let output = match base_command(command) {
            "ls" | "dir" => self.listing(),
            "cat" | "type" => {
                let path = command.split_whitespace().nth(1).unwrap_or("");
                match self.store.as_ref().and_then(|s| s.get(path)) {
                    Some(record) => record.content().to_string(),
                    None => format!("cat: {path}: No such file"),
                }
            }
            "npm" if command.split_whitespace().nth(1) == Some("install") => {
                "Dependencies installed successfully!".into()
            }
            "git" => "Git operation completed successfully.".into(),
            _ => format!("Command executed: {command}"),
        };
        Ok(output)
    }
}

// --- Host ---

/// Runs commands in a real shell, restricted to an allowlist.
pub struct HostRunner {
    /// If non-empty, only these base commands are allowed.
    allowed_commands: Vec<String>,
    timeout: Duration,
}

impl HostRunner {
    pub fn new(allowed_commands: Vec<String>, timeout: Duration) -> Self {
        Self {
            allowed_commands,
            timeout,
        }
    }

    fn is_command_allowed(&self, command: &str) -> bool {
        self.check(command).is_ok()
    }

    /// With an allowlist in force, a command must be a single allowed
    /// program: any shell operator would let a second program run.
    fn check(&self, command: &str) -> Result<(), String> {
        if self.allowed_commands.is_empty() {
            return Ok(());
        }
        if let Some(op) = shell_operator(command) {
            return Err(format!("Shell operator {op:?} is not allowed"));
        }
        let base = base_command(command);
        if self.allowed_commands.iter().any(|a| a == base) {
            Ok(())
        } else {
            Err(format!("Command '{base}' not in allowlist"))
        }
    }
}

/// Characters that chain, substitute, group or redirect in `sh` and `cmd`.
const SHELL_OPERATORS: &[char] = &[';', '&', '|', '`', '$', '>', '<', '(', ')', '\n', '\r', '^', '%'];

fn shell_operator(command: &str) -> Option<char> {
    command.chars().find(|c| SHELL_OPERATORS.contains(c))
}

#[async_trait]
impl CommandRunner for HostRunner {
    fn mode(&self) -> &str {
        "host"
    }

    async fn run(&self, command: &str) -> Result<String, ToolError> {
        if let Err(reason) = self.check(command) {
            warn!(command = %command, reason = %reason, "Command rejected");
            return Err(ToolError::PermissionDenied {
                tool_name: EXECUTE_COMMAND.into(),
                reason,
            });
        }

        let mut child = if cfg!(target_os = "windows") {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", command]);
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.args(["-c", command]);
            cmd
        };
        child.kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, child.output())
            .await
            .map_err(|_| ToolError::Timeout {
                tool_name: EXECUTE_COMMAND.into(),
                timeout_secs: self.timeout.as_secs(),
            })?
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: EXECUTE_COMMAND.into(),
                reason: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            warn!(command = %command, exit_code = code, "Command failed");
            return Err(ToolError::ExecutionFailed {
                tool_name: EXECUTE_COMMAND.into(),
                reason: format!("exit code {code}: {}", stderr.trim()),
            });
        }

        let text = if !stdout.trim().is_empty() {
            stdout
        } else if !stderr.trim().is_empty() {
            stderr
        } else {
            "Command executed successfully".into()
        };
        Ok(text.trim().to_string())
    }
}
