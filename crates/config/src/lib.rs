//! Configuration loading and validation for codeloop.
//!
//! Loads configuration from `~/.codeloop/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.codeloop/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model backends
    #[serde(default)]
    pub backends: BackendsConfig,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Built-in tool settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Virtual file store settings
    #[serde(default)]
    pub files: FilesConfig,

    /// HTTP gateway settings
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendsConfig {
    #[serde(default = "default_gpt4")]
    pub gpt4: BackendConfig,

    #[serde(default = "default_gemini")]
    pub gemini: BackendConfig,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            gpt4: default_gpt4(),
            gemini: default_gemini(),
        }
    }
}

/// Settings for a single model backend.
#[derive(Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    pub api_url: String,

    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Harvest fenced code from unstructured replies into files
    #[serde(default)]
    pub extract_code_blocks: bool,
}

impl BackendConfig {
    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

fn default_gpt4() -> BackendConfig {
    BackendConfig {
        api_key: None,
        api_url: "https://api.openai.com/v1".into(),
        model: "gpt-4o-mini".into(),
        temperature: default_temperature(),
        max_tokens: default_max_tokens(),
        extract_code_blocks: false,
    }
}

fn default_gemini() -> BackendConfig {
    BackendConfig {
        api_key: None,
        api_url: "https://generativelanguage.googleapis.com/v1beta".into(),
        model: "gemini-pro".into(),
        temperature: default_temperature(),
        max_tokens: default_max_tokens(),
        extract_code_blocks: true,
    }
}

fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_true() -> bool {
    true
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("extract_code_blocks", &self.extract_code_blocks)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Backend round trips allowed per user message
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    #[serde(default = "default_backend_timeout_secs")]
    pub backend_timeout_secs: u64,

    /// Keep transcripts across messages of the same conversation
    #[serde(default = "default_true")]
    pub persist_transcripts: bool,

    /// Replace the generated system instructions entirely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_override: Option<String>,
}

fn default_max_iterations() -> u32 {
    8
}
fn default_backend_timeout_secs() -> u64 {
    60
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            backend_timeout_secs: default_backend_timeout_secs(),
            persist_transcripts: true,
            system_prompt_override: None,
        }
    }
}

/// How `executeCommand` is carried out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandMode {
    /// Canned answers; nothing runs on the host
    #[default]
    Simulated,
    /// Real shell, restricted to `allowed_commands`
    Host,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub command_mode: CommandMode,

    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,

    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

fn default_allowed_commands() -> Vec<String> {
    vec!["ls".into(), "cat".into(), "echo".into(), "pwd".into()]
}
fn default_command_timeout_secs() -> u64 {
    30
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            command_mode: CommandMode::Simulated,
            allowed_commands: default_allowed_commands(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    /// Start with a small React project in the store
    #[serde(default = "default_true")]
    pub seed_sample_project: bool,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            seed_sample_project: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    3001
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.codeloop/config.toml).
    ///
    /// Environment overrides:
    /// - `OPENAI_API_KEY` / `GEMINI_API_KEY` (only when the file has no key)
    /// - `CODELOOP_PORT`
    /// - `CODELOOP_MAX_ITERATIONS`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup, then re-validate.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.backends.gpt4.api_key.is_none() {
            self.backends.gpt4.api_key = lookup("OPENAI_API_KEY");
        }
        if self.backends.gemini.api_key.is_none() {
            self.backends.gemini.api_key = lookup("GEMINI_API_KEY");
        }

        if let Some(port) = lookup("CODELOOP_PORT") {
            self.gateway.port = port.parse().map_err(|_| {
                ConfigError::ValidationError(format!("CODELOOP_PORT is not a port number: {port}"))
            })?;
        }

        if let Some(max) = lookup("CODELOOP_MAX_ITERATIONS") {
            self.agent.max_iterations = max.parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "CODELOOP_MAX_ITERATIONS is not a number: {max}"
                ))
            })?;
        }

        self.validate()
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".codeloop")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        if self.agent.backend_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agent.backend_timeout_secs must be at least 1".into(),
            ));
        }

        if self.tools.command_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "tools.command_timeout_secs must be at least 1".into(),
            ));
        }

        for (name, backend) in [("gpt4", &self.backends.gpt4), ("gemini", &self.backends.gemini)] {
            if !(0.0..=2.0).contains(&backend.temperature) {
                return Err(ConfigError::ValidationError(format!(
                    "backends.{name}.temperature must be between 0.0 and 2.0"
                )));
            }
        }

        if self.gateway.port == 0 {
            return Err(ConfigError::ValidationError("gateway.port must be non-zero".into()));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
