//! Backend router: maps a [`BackendKind`] to a configured backend.
//!
//! Only backends with credentials are registered, so an unavailable
//! backend is detected before any transcript is touched.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use codeloop_config::{AppConfig, BackendConfig};
use codeloop_core::provider::Provider;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::gemini::GeminiProvider;
use crate::openai_compat::OpenAiCompatProvider;

/// The backends a request may select.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Gpt4,
    Gemini,
}

impl BackendKind {
    pub const ALL: [BackendKind; 2] = [BackendKind::Gpt4, BackendKind::Gemini];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gpt4 => "gpt4",
            Self::Gemini => "gemini",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A model name that is not one of the [`BackendKind`]s.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown model '{0}' (expected gpt4 or gemini)")]
pub struct UnknownBackend(pub String);

impl FromStr for BackendKind {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gpt4" => Ok(Self::Gpt4),
            "gemini" => Ok(Self::Gemini),
            _ => Err(UnknownBackend(s.to_string())),
        }
    }
}

/// A registered backend with its call settings.
#[derive(Clone)]
pub struct Backend {
    pub provider: Arc<dyn Provider>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Run the code-block extractor when the reply is not a step
    pub extract_code_blocks: bool,
}

impl Backend {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.3,
            max_tokens: None,
            extract_code_blocks: false,
        }
    }

    pub fn with_extract_code_blocks(mut self, enabled: bool) -> Self {
        self.extract_code_blocks = enabled;
        self
    }

    fn from_config(provider: Arc<dyn Provider>, config: &BackendConfig) -> Self {
        Self {
            provider,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: Some(config.max_tokens),
            extract_code_blocks: config.extract_code_blocks,
        }
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("extract_code_blocks", &self.extract_code_blocks)
            .finish()
    }
}

/// Routes requests to the backend a caller selected.
#[derive(Default, Clone)]
pub struct BackendRouter {
    backends: BTreeMap<BackendKind, Backend>,
}

impl BackendRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a backend.
    pub fn register(&mut self, kind: BackendKind, backend: Backend) {
        self.backends.insert(kind, backend);
    }

    pub fn with(mut self, kind: BackendKind, backend: Backend) -> Self {
        self.register(kind, backend);
        self
    }

    pub fn get(&self, kind: BackendKind) -> Option<&Backend> {
        self.backends.get(&kind)
    }

    pub fn is_available(&self, kind: BackendKind) -> bool {
        self.backends.contains_key(&kind)
    }

    /// Registered kinds, in declaration order.
    pub fn available(&self) -> Vec<BackendKind> {
        self.backends.keys().copied().collect()
    }
}

/// Build the router from configuration. Backends without an API key are skipped.
pub fn build_from_config(config: &AppConfig) -> BackendRouter {
    let mut router = BackendRouter::new();

    let gpt4 = &config.backends.gpt4;
    if let Some(key) = gpt4.api_key.as_deref().filter(|_| gpt4.is_configured()) {
        let provider = Arc::new(OpenAiCompatProvider::new("openai", &gpt4.api_url, key));
        router.register(BackendKind::Gpt4, Backend::from_config(provider, gpt4));
    }

    let gemini = &config.backends.gemini;
    if let Some(key) = gemini.api_key.as_deref().filter(|_| gemini.is_configured()) {
        let provider = Arc::new(GeminiProvider::new(&gemini.api_url, key));
        router.register(BackendKind::Gemini, Backend::from_config(provider, gemini));
    }

    info!(
        backends = ?router.available().iter().map(|k| k.as_str()).collect::<Vec<_>>(),
        "Backends configured"
    );
    router
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parsing() {
        assert_eq!("gpt4".parse::<BackendKind>().unwrap(), BackendKind::Gpt4);
        assert_eq!("Gemini".parse::<BackendKind>().unwrap(), BackendKind::Gemini);
        assert!("claude".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::default(), BackendKind::Gpt4);
    }

    #[test]
    fn kind_wire_names() {
        assert_eq!(serde_json::to_string(&BackendKind::Gpt4).unwrap(), "\"gpt4\"");
        let kind: BackendKind = serde_json::from_str("\"gemini\"").unwrap();
        assert_eq!(kind, BackendKind::Gemini);
    }

    #[test]
    fn unconfigured_backends_are_skipped() {
        let router = build_from_config(&AppConfig::default());
        assert!(router.available().is_empty());
        assert!(router.get(BackendKind::Gpt4).is_none());
    }

    #[test]
    fn configured_backends_are_registered() {
        let mut config = AppConfig::default();
        config.backends.gemini.api_key = Some("g-key".into());
        config.backends.gpt4.api_key = Some("   ".into());

        let router = build_from_config(&config);
        assert_eq!(router.available(), vec![BackendKind::Gemini]);

        let gemini = router.get(BackendKind::Gemini).unwrap();
        assert_eq!(gemini.model, "gemini-pro");
        assert!(gemini.extract_code_blocks);
        assert_eq!(gemini.max_tokens, Some(1000));
        assert_eq!(gemini.provider.name(), "gemini");
    }
}
