//! The adapter contract: the boundary between this engine and a concrete
//! LLM provider's wire protocol. Out of scope to implement — every
//! provider-specific HTTP client is an external collaborator — but the
//! shape the agent loop depends on lives here.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;

use crate::abort::AbortSignal;
use crate::error::Result;
use crate::message::LLMMessage;

/// A tool's adapter-facing schema: enough for the provider to decide
/// whether/how to call it.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Events an adapter implementation produces while streaming one turn.
/// Required kinds per the adapter contract: text delta, thinking delta,
/// tool-call start/delta/end, and a final `Finish`. Tool-call ids must
/// stay stable across a call's start/delta/end triple.
#[derive(Debug, Clone)]
pub enum AdapterEvent {
    TextDelta(String),
    ThinkingDelta(String),
    ToolCallStart { id: String, name: String },
    ToolCallDelta { id: String, args_delta: String },
    ToolCallEnd { id: String },
    Finish { reason: FinishReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Complete,
    ToolCalls,
    Length,
    Aborted,
}

pub type AdapterStream = Pin<Box<dyn Stream<Item = AdapterEvent> + Send>>;

/// Implemented once per provider wire protocol. The agent loop calls
/// `stream` once per inner-loop iteration and re-emits every item as a
/// `StreamEvent`. Implementations must honour `abort` within a bounded
/// latency (≤250ms preferred) and must not re-use a tool-call id across
/// distinct calls within the same stream.
#[async_trait]
pub trait Adapter: Send + Sync {
    async fn stream(
        &self,
        messages: &[LLMMessage],
        tools: &[ToolSchema],
        model: &str,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
        abort: AbortSignal,
    ) -> Result<AdapterStream>;
}
