//! Built-in tool implementations for codeloop.
//!
//! Three tools are registered by default:
//! - `getWeatherInfo`: deterministic weather stub
//! - `executeCommand`: command execution through a pluggable runner,
//!   simulated unless the host runner is explicitly chosen
//! - `createFile`: writes into the virtual file store

pub mod command;
pub mod create_file;
pub mod weather;

use std::sync::Arc;

use codeloop_core::event::EventBus;
use codeloop_core::tool::ToolRegistry;
use codeloop_files::VirtualFileStore;

pub use command::{CommandRunner, CommandTool, HostRunner, SimulatedRunner};
pub use create_file::CreateFileTool;
pub use weather::WeatherTool;

/// Name of the weather tool.
pub const GET_WEATHER_INFO: &str = "getWeatherInfo";
/// Name of the command tool.
pub const EXECUTE_COMMAND: &str = "executeCommand";
/// Name of the file-creation tool.
pub const CREATE_FILE: &str = "createFile";

/// Create a registry with all built-in tools and simulated commands.
pub fn default_registry(store: Arc<VirtualFileStore>) -> ToolRegistry {
    let runner = Arc::new(SimulatedRunner::new().with_store(store.clone()));
    registry_with(store, runner, None)
}

/// Create a registry with an explicit command runner and optional event bus.
pub fn registry_with(
    store: Arc<VirtualFileStore>,
    runner: Arc<dyn CommandRunner>,
    events: Option<Arc<EventBus>>,
) -> ToolRegistry {
    let mut create_file = CreateFileTool::new(store);
    if let Some(bus) = events {
        create_file = create_file.with_events(bus);
    }

    let mut registry = ToolRegistry::new();
    registry.register(Box::new(WeatherTool));
    registry.register(Box::new(CommandTool::new(runner)));
    registry.register(Box::new(create_file));
    registry
}

/// Read a scalar tool input: either a bare JSON scalar or an object
/// carrying `field`.
pub(crate) fn scalar_input(input: &serde_json::Value, field: &str) -> Option<String> {
    match input {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Object(map) => map.get(field).and_then(|v| scalar_input(v, field)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_builtins() {
        let registry = default_registry(Arc::new(VirtualFileStore::new()));
        assert_eq!(registry.names(), vec![CREATE_FILE, EXECUTE_COMMAND, GET_WEATHER_INFO]);
    }

    #[test]
    fn scalar_input_accepts_bare_and_wrapped_values() {
        let field = "cityName";
        assert_eq!(scalar_input(&serde_json::json!("Paris"), field).as_deref(), Some("Paris"));
        assert_eq!(
            scalar_input(&serde_json::json!({"cityName": "Oslo"}), field).as_deref(),
            Some("Oslo")
        );
        assert_eq!(scalar_input(&serde_json::json!(7), field).as_deref(), Some("7"));
        assert!(scalar_input(&serde_json::json!({"city": "Oslo"}), field).is_none());
        assert!(scalar_input(&serde_json::json!(null), field).is_none());
    }

    #[tokio::test]
    async fn lowercase_weather_name_resolves() {
        let registry = default_registry(Arc::new(VirtualFileStore::new()));
        let outcome = registry.invoke("getweatherinfo", serde_json::json!("Karachi")).await;
        assert!(outcome.success);
        assert!(outcome.output.contains("Karachi"));
    }
}
