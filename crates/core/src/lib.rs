//! # codeloop core
//!
//! Domain types, traits, and error definitions for the codeloop agent runtime.
//! This crate has no framework dependencies: it defines the model that the
//! backend, tool, file-store and orchestrator crates implement against.
//!
//! ## Layout
//!
//! - [`message`]: transcript turns and conversations
//! - [`step`]: the discriminated think/action/observe/output unit
//! - [`provider`]: the language-model backend abstraction
//! - [`tool`]: the tool trait and the registry that dispatches to it
//! - [`event`]: a broadcast bus for domain events

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod step;
pub mod tool;

pub use error::{ProviderError, ToolError};
pub use event::{DomainEvent, EventBus, FileChange};
pub use message::{Conversation, ConversationId, Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use step::{Step, StepKind, StepRecord};
pub use tool::{Tool, ToolEffect, ToolOutcome, ToolRegistry};
