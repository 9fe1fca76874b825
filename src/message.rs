//! Conversation message types shared by the context manager, event bus,
//! and agent loop.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
    /// UI-only; filtered out of every `LLMMessage` projection.
    Thinking,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// JSON-encoded arguments, as produced by the adapter's streamed deltas.
    pub arguments: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default)]
    pub child_id: Option<String>,
}

/// A message in the agent's working history. Strictly a superset of what
/// a provider accepts — metadata and the `thinking` role never reach the
/// wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub tool_call_id: Option<String>,
    #[serde(default)]
    pub metadata: MessageMetadata,
}

impl AgentMessage {
    pub fn system(content: impl Into<String>) -> Self {
        AgentMessage { role: Role::System, content: content.into(), tool_calls: Vec::new(), tool_call_id: None, metadata: Default::default() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        AgentMessage { role: Role::User, content: content.into(), tool_calls: Vec::new(), tool_call_id: None, metadata: Default::default() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        AgentMessage { role: Role::Assistant, content: content.into(), tool_calls: Vec::new(), tool_call_id: None, metadata: Default::default() }
    }

    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        AgentMessage { role: Role::Assistant, content: content.into(), tool_calls, tool_call_id: None, metadata: Default::default() }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        AgentMessage {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
            metadata: Default::default(),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// The strict provider-facing projection of `AgentMessage`: no `thinking`
/// role, no agent-only metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMMessage {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub tool_call_id: Option<String>,
}

/// Project agent history down to what the adapter is allowed to see.
pub fn project_to_llm_messages(history: &[AgentMessage]) -> Vec<LLMMessage> {
    history
        .iter()
        .filter(|m| m.role != Role::Thinking)
        .map(|m| LLMMessage {
            role: m.role,
            content: m.content.clone(),
            tool_calls: m.tool_calls.clone(),
            tool_call_id: m.tool_call_id.clone(),
        })
        .collect()
}

/// Adapter stream events, re-emitted by the agent loop as `StreamEvent`s.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    TextStart,
    TextDelta { content: String },
    TextEnd,
    ThinkingStart,
    ThinkingDelta { content: String },
    ThinkingEnd,
    ToolCallStart { tool_call_id: String, tool_name: String },
    ToolCallDelta { tool_call_id: String, args_delta: String },
    ToolCallEnd { tool_call_id: String },
    ToolResult { tool_call_id: String, content: String },
    TurnStart,
    TurnEnd,
    Done,
    Error { error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_drops_thinking_messages_and_metadata() {
        let history = vec![
            AgentMessage::system("sys"),
            AgentMessage { role: Role::Thinking, content: "internal".into(), tool_calls: vec![], tool_call_id: None, metadata: Default::default() },
            AgentMessage::user("hi"),
        ];
        let projected = project_to_llm_messages(&history);
        assert_eq!(projected.len(), 2);
        assert!(projected.iter().all(|m| m.role != Role::Thinking));
    }

    #[test]
    fn tool_call_id_round_trips_through_projection() {
        let history = vec![AgentMessage::tool_result("c1", "result text")];
        let projected = project_to_llm_messages(&history);
        assert_eq!(projected[0].tool_call_id.as_deref(), Some("c1"));
    }
}
