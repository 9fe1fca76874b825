//! `agent-core`: the runtime of a skill-driven LLM agent engine — skill
//! pipeline, event bus, context manager, tool execution core, and the
//! agent loop tying them together.
//!
//! What this crate does NOT do: speak to a concrete LLM provider (see
//! [`adapter::Adapter`]), persist sessions, or provide a UI. Those are
//! external collaborators by design.

pub mod abort;
pub mod adapter;
pub mod agent;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod message;
pub mod placeholder;
pub mod platform;
pub mod skills;
pub mod tools;

pub use abort::{AbortHandle, AbortSignal};
pub use adapter::{Adapter, AdapterEvent, AdapterStream, FinishReason as AdapterFinishReason, ToolSchema};
pub use agent::{build_agent_runner, AgentRunner, ChatOutcome, FinishReason};
pub use config::AgentConfig;
pub use context::ContextManager;
pub use error::{AgentError, Result};
pub use events::{Event, EventBus, EventHandler, EventKind, EventResponse};
pub use message::{AgentMessage, LLMMessage, Role, StreamEvent, ToolCall};
pub use skills::{Skill, SkillEngine};
pub use tools::{Tool, ToolContext, ToolRegistry};
