//! Compaction strategies.
//!
//! Both strategies preserve tool-call/tool-result pairing: if an
//! assistant message carrying a tool call is dropped, its matching
//! tool-result message is dropped too, and vice versa.

use async_trait::async_trait;

use crate::error::Result;
use crate::message::{AgentMessage, Role};

use super::estimate::estimate_messages;

#[async_trait]
pub trait CompactionStrategy: Send + Sync {
    async fn compact(&self, messages: &[AgentMessage], target_tokens: usize) -> Result<Vec<AgentMessage>>;
}

/// Drops the oldest non-system messages (respecting tool-call/result
/// pairing) until the remainder fits `target_tokens`. The leading system
/// message, if any, is always retained.
pub struct SlidingWindow;

#[async_trait]
impl CompactionStrategy for SlidingWindow {
    async fn compact(&self, messages: &[AgentMessage], target_tokens: usize) -> Result<Vec<AgentMessage>> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }

        let system_prefix_len = messages.iter().take_while(|m| m.role == Role::System).count();
        let (system, rest) = messages.split_at(system_prefix_len);

        let mut kept: Vec<AgentMessage> = rest.to_vec();

        while !kept.is_empty() {
            let total = estimate_messages(system) + estimate_messages(&kept);
            if total <= target_tokens {
                break;
            }
            drop_oldest_pair(&mut kept);
        }

        let mut result = system.to_vec();
        result.extend(kept);
        Ok(result)
    }
}

/// Removes the dropped head of `kept`, additionally removing its paired
/// tool-call/tool-result partner if the drop would otherwise orphan one.
fn drop_oldest_pair(kept: &mut Vec<AgentMessage>) {
    if kept.is_empty() {
        return;
    }
    let removed = kept.remove(0);

    if removed.has_tool_calls() {
        let ids: std::collections::HashSet<&str> = removed.tool_calls.iter().map(|c| c.id.as_str()).collect();
        kept.retain(|m| m.tool_call_id.as_deref().map(|id| !ids.contains(id)).unwrap_or(true));
    } else if let Some(id) = &removed.tool_call_id {
        kept.retain(|m| !m.tool_calls.iter().any(|c| &c.id == id));
    }
}

/// Replaces the dropped prefix with a single system-role summary message
/// produced by `summarise`. The summariser must not itself trigger
/// compaction (no recursive re-entry).
pub struct Summarising<F> {
    pub summarise: F,
}

#[async_trait]
impl<F> CompactionStrategy for Summarising<F>
where
    F: Fn(&[AgentMessage]) -> futures::future::BoxFuture<'static, Result<String>> + Send + Sync,
{
    async fn compact(&self, messages: &[AgentMessage], target_tokens: usize) -> Result<Vec<AgentMessage>> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }

        let system_prefix_len = messages.iter().take_while(|m| m.role == Role::System).count();
        let (system, rest) = messages.split_at(system_prefix_len);

        // Find the smallest tail of `rest` that still fits in `target_tokens`
        // alongside the system prefix; everything before that tail is summarised.
        let system_tokens = estimate_messages(system);
        let mut cutoff = rest.len();
        let mut tail_tokens = 0usize;
        while cutoff > 0 {
            let next_tokens = estimate_messages(&rest[cutoff - 1..cutoff]);
            if system_tokens + tail_tokens + next_tokens > target_tokens {
                break;
            }
            tail_tokens += next_tokens;
            cutoff -= 1;
        }

        let (to_summarise, retained) = rest.split_at(cutoff);
        let summary_text = (self.summarise)(to_summarise).await?;

        let mut result = system.to_vec();
        if !summary_text.is_empty() {
            result.push(AgentMessage::system(summary_text));
        }
        result.extend(retained.iter().cloned());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolCall;

    #[tokio::test]
    async fn sliding_window_keeps_leading_system_message() {
        let messages = vec![
            AgentMessage::system("sys"),
            AgentMessage::user(&"a".repeat(400)),
            AgentMessage::assistant(&"b".repeat(400)),
        ];
        let result = SlidingWindow.compact(&messages, 20).await.unwrap();
        assert_eq!(result[0].role, Role::System);
    }

    #[tokio::test]
    async fn sliding_window_preserves_tool_call_pairing() {
        let messages = vec![
            AgentMessage::system("sys"),
            AgentMessage::user(&"a".repeat(200)),
            AgentMessage::assistant_with_tool_calls(
                "",
                vec![ToolCall { id: "c1".into(), name: "execute".into(), arguments: "{}".into() }],
            ),
            AgentMessage::tool_result("c1", &"result".repeat(50)),
            AgentMessage::assistant(&"final".repeat(100)),
        ];
        let result = SlidingWindow.compact(&messages, 30).await.unwrap();

        let has_call = result.iter().any(|m| m.has_tool_calls());
        let has_result = result.iter().any(|m| m.tool_call_id.as_deref() == Some("c1"));
        assert_eq!(has_call, has_result, "tool call and its result must drop together");
    }

    #[tokio::test]
    async fn summarising_strategy_replaces_head_with_summary() {
        let messages = vec![
            AgentMessage::system("sys"),
            AgentMessage::user(&"old".repeat(200)),
            AgentMessage::assistant(&"recent".repeat(5)),
        ];
        let strategy = Summarising {
            summarise: |_msgs: &[AgentMessage]| Box::pin(async { Ok("summary of earlier conversation".to_string()) }),
        };
        let result = strategy.compact(&messages, 30).await.unwrap();
        assert!(result.iter().any(|m| m.content.contains("summary of earlier conversation")));
    }
}
