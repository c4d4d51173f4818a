//! # BoltStudio Core
//!
//! Domain types, collaborator traits, and error definitions for the
//! BoltStudio coding-agent orchestrator. This crate has **no framework
//! dependencies**: it defines the model every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (model endpoint, execution sandbox, network
//! proxy, project persistence) is a trait here. Implementations live in
//! their respective crates, which keeps the orchestration engine testable
//! against scripted fakes.

pub mod directive;
pub mod error;
pub mod event;
pub mod message;
pub mod project;
pub mod provider;
pub mod sandbox;

// Re-export key types at crate root for ergonomics
pub use directive::{Directive, FileDirective, PlanStep, StepStatus, ToolDirective, ToolKind};
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use message::{Conversation, ConversationId, Message, Role};
pub use project::{ProjectSnapshot, ProjectStore};
pub use provider::{ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk};
pub use sandbox::{DirEntry, FetchedPage, ProcessOutput, Sandbox, WebProxy};
