//! Composition root: builds the store, tools, backends and orchestrator
//! from configuration.

use std::sync::Arc;
use std::time::Duration;

use codeloop_agent::{
    EphemeralTranscripts, InMemoryTranscripts, Orchestrator, OrchestratorConfig, TranscriptStore,
};
use codeloop_config::{AppConfig, CommandMode};
use codeloop_core::event::EventBus;
use codeloop_files::VirtualFileStore;
use codeloop_tools::{CommandRunner, HostRunner, SimulatedRunner};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

pub struct App {
    pub config: AppConfig,
    pub files: Arc<VirtualFileStore>,
    pub orchestrator: Arc<Orchestrator>,
    pub events: Arc<EventBus>,
}

impl App {
    /// Load configuration from disk and the environment, then build.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
        Self::from_config(config)
    }

    pub fn from_config(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let files = Arc::new(if config.files.seed_sample_project {
            VirtualFileStore::with_sample_project()?
        } else {
            VirtualFileStore::new()
        });

        let events = Arc::new(EventBus::default());

        let runner: Arc<dyn CommandRunner> = match config.tools.command_mode {
            CommandMode::Simulated => Arc::new(SimulatedRunner::new().with_store(files.clone())),
            CommandMode::Host => {
                warn!(
                    allowed = ?config.tools.allowed_commands,
                    "executeCommand runs real host commands"
                );
                Arc::new(HostRunner::new(
                    config.tools.allowed_commands.clone(),
                    Duration::from_secs(config.tools.command_timeout_secs),
                ))
            }
        };
        let tools = Arc::new(codeloop_tools::registry_with(
            files.clone(),
            runner,
            Some(events.clone()),
        ));

        let transcripts: Arc<dyn TranscriptStore> = if config.agent.persist_transcripts {
            Arc::new(InMemoryTranscripts::new())
        } else {
            Arc::new(EphemeralTranscripts)
        };

        let orchestrator = Orchestrator::new(codeloop_providers::build_from_config(&config), tools)
            .with_config(OrchestratorConfig::from(&config.agent))
            .with_transcripts(transcripts)
            .with_event_bus(events.clone());

        Ok(Self {
            config,
            files,
            orchestrator: Arc::new(orchestrator),
            events,
        })
    }

    /// Log every domain event at debug level for as long as the process runs.
    pub fn spawn_event_log(&self) {
        let mut rx = self.events.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => debug!(event = ?event, "Domain event"),
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event log lagged"),
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }
}
