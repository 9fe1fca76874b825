//! The event bus: prioritised, ordered, intercepting pub/sub over a closed
//! set of lifecycle events.
//!
//! Handlers for a given event fire in descending priority order (ties by
//! registration order). Aggregation rules differ per event — see each
//! `Event` variant's doc comment. Handler panics/errors are caught, logged,
//! and never abort emission.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::FutureExt;
use tracing::warn;

use crate::message::AgentMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    AgentStart,
    AgentEnd,
    TurnStart,
    TurnEnd,
    BeforeToolCall,
    AfterToolResult,
    ContextTransform,
    Input,
    ToolExecutionUpdate,
    SessionStart,
    SessionEnd,
    ModelChange,
    Compaction,
}

#[derive(Debug, Clone)]
pub enum Event {
    AgentStart,
    AgentEnd { finish_reason: String },
    TurnStart { turn: u32 },
    TurnEnd { turn: u32 },
    /// Aggregation: any handler returning `Block` halts the call; later
    /// handlers still observe but cannot override a block.
    BeforeToolCall { tool_call_id: String, tool_name: String, arguments: String },
    /// Aggregation: a handler's `result` replacement chains into the next handler's input.
    AfterToolResult { tool_call_id: String, tool_name: String, result: String },
    /// Aggregation: a handler's `messages` replacement chains into the next handler's input.
    ContextTransform { messages: Vec<AgentMessage> },
    /// Aggregation: the first `Handled` short-circuits; no downstream handlers run.
    Input { message: String },
    ToolExecutionUpdate { tool_call_id: String, chunk: String },
    SessionStart,
    SessionEnd,
    ModelChange { from: String, to: String },
    Compaction { messages_before: usize, messages_after: usize, tokens_before: usize, tokens_after: usize },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::AgentStart => EventKind::AgentStart,
            Event::AgentEnd { .. } => EventKind::AgentEnd,
            Event::TurnStart { .. } => EventKind::TurnStart,
            Event::TurnEnd { .. } => EventKind::TurnEnd,
            Event::BeforeToolCall { .. } => EventKind::BeforeToolCall,
            Event::AfterToolResult { .. } => EventKind::AfterToolResult,
            Event::ContextTransform { .. } => EventKind::ContextTransform,
            Event::Input { .. } => EventKind::Input,
            Event::ToolExecutionUpdate { .. } => EventKind::ToolExecutionUpdate,
            Event::SessionStart => EventKind::SessionStart,
            Event::SessionEnd => EventKind::SessionEnd,
            Event::ModelChange { .. } => EventKind::ModelChange,
            Event::Compaction { .. } => EventKind::Compaction,
        }
    }
}

/// What a handler may hand back. Only some variants are meaningful for a
/// given event kind; see `Event`'s doc comments for which.
#[derive(Debug, Clone)]
pub enum EventResponse {
    Block { reason: String },
    ReplaceResult(String),
    ReplaceMessages(Vec<AgentMessage>),
    Handled { response: Option<String> },
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> Option<EventResponse>;
}

#[async_trait]
impl<F> EventHandler for F
where
    F: Fn(&Event) -> Option<EventResponse> + Send + Sync,
{
    async fn handle(&self, event: &Event) -> Option<EventResponse> {
        self(event)
    }
}

struct Subscription {
    id: u64,
    priority: i32,
    seq: u64,
    source_tag: String,
    handler: Arc<dyn EventHandler>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

/// The aggregated outcome of one `emit` call.
#[derive(Debug, Clone, Default)]
pub struct EmitOutcome {
    pub blocked: Option<String>,
    pub replaced_result: Option<String>,
    pub replaced_messages: Option<Vec<AgentMessage>>,
    pub handled: Option<Option<String>>,
}

#[derive(Default)]
pub struct EventBus {
    subscriptions: RwLock<std::collections::HashMap<EventKind, Vec<Subscription>>>,
    next_id: AtomicU64,
    next_seq: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(
        &self,
        kind: EventKind,
        handler: Arc<dyn EventHandler>,
        priority: i32,
        source_tag: impl Into<String>,
    ) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let mut subs = self.subscriptions.write().expect("event bus lock poisoned");
        let list = subs.entry(kind).or_default();
        list.push(Subscription { id, priority, seq, source_tag: source_tag.into(), handler });
        list.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
        SubscriptionId(id)
    }

    pub fn off(&self, id: SubscriptionId) {
        let mut subs = self.subscriptions.write().expect("event bus lock poisoned");
        for list in subs.values_mut() {
            list.retain(|s| s.id != id.0);
        }
    }

    /// Unsubscribe every handler registered under `source_tag`.
    pub fn off_source(&self, source_tag: &str) {
        let mut subs = self.subscriptions.write().expect("event bus lock poisoned");
        for list in subs.values_mut() {
            list.retain(|s| s.source_tag != source_tag);
        }
    }

    /// Emit `event` to every subscriber of its kind, in priority order,
    /// aggregating responses per that kind's rule.
    pub async fn emit(&self, event: Event) -> EmitOutcome {
        let kind = event.kind();
        let handlers: Vec<Arc<dyn EventHandler>> = {
            let subs = self.subscriptions.read().expect("event bus lock poisoned");
            subs.get(&kind).map(|l| l.iter().map(|s| s.handler.clone()).collect()).unwrap_or_default()
        };

        let mut outcome = EmitOutcome::default();
        let mut current_event = event;

        for handler in handlers {
            let result = AssertUnwindSafe(handler.handle(&current_event)).catch_unwind().await;
            let response = match result {
                Ok(r) => r,
                Err(_) => {
                    warn!(?kind, "event handler panicked; continuing emission");
                    continue;
                }
            };

            let Some(response) = response else { continue };

            match (&kind, response) {
                (EventKind::BeforeToolCall, EventResponse::Block { reason }) => {
                    if outcome.blocked.is_none() {
                        outcome.blocked = Some(reason);
                    }
                    // remaining handlers still observe, per spec.
                }
                (EventKind::AfterToolResult, EventResponse::ReplaceResult(new_result)) => {
                    if let Event::AfterToolResult { result, .. } = &mut current_event {
                        *result = new_result.clone();
                    }
                    outcome.replaced_result = Some(new_result);
                }
                (EventKind::ContextTransform, EventResponse::ReplaceMessages(new_messages)) => {
                    if let Event::ContextTransform { messages } = &mut current_event {
                        *messages = new_messages.clone();
                    }
                    outcome.replaced_messages = Some(new_messages);
                }
                (EventKind::Input, EventResponse::Handled { response }) => {
                    outcome.handled = Some(response);
                    break;
                }
                _ => {
                    // Observational-only event, or a response variant that
                    // doesn't match this event kind's aggregation rule.
                }
            }
        }

        outcome
    }
}
