//! Token-budget-aware context management: decide when to compact, and
//! apply a pluggable compaction strategy.

pub mod compaction;
pub mod estimate;

use crate::error::Result;
use crate::message::AgentMessage;

pub use compaction::{CompactionStrategy, SlidingWindow, Summarising};
pub use estimate::{estimate_messages, estimate_tokens};

const DEFAULT_THRESHOLD: f64 = 0.9;

pub struct ContextManager {
    pub context_window: usize,
    pub reserve_tokens: usize,
    pub threshold: f64,
    pub strategy: Box<dyn CompactionStrategy>,
}

impl ContextManager {
    pub fn new(context_window: usize, reserve_tokens: usize, strategy: Box<dyn CompactionStrategy>) -> Self {
        ContextManager { context_window, reserve_tokens, threshold: DEFAULT_THRESHOLD, strategy }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    fn trigger_tokens(&self) -> f64 {
        (self.context_window as f64) * self.threshold - (self.reserve_tokens as f64)
    }

    /// True iff `estimate(messages) + reserve_tokens >= context_window * threshold`.
    pub fn should_compact(&self, messages: &[AgentMessage]) -> bool {
        let estimate = estimate_messages(messages) as f64;
        estimate + self.reserve_tokens as f64 >= (self.context_window as f64) * self.threshold
    }

    /// Compact down to a budget that leaves headroom below the trigger.
    pub async fn compact(&self, messages: &[AgentMessage]) -> Result<Vec<AgentMessage>> {
        let target = self.trigger_tokens().max(0.0) as usize;
        self.strategy.compact(messages, target).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::AgentMessage;

    fn manager(window: usize, reserve: usize) -> ContextManager {
        ContextManager::new(window, reserve, Box::new(SlidingWindow))
    }

    #[test]
    fn should_compact_boundary_is_precise() {
        let mgr = manager(1000, 0).with_threshold(0.9);
        // Construct messages whose estimate lands exactly at the trigger.
        let trigger = (1000.0 * 0.9) as usize;
        let padding = "a".repeat((trigger.saturating_sub(4)) * 4);
        let messages = vec![AgentMessage::user(&padding)];
        assert!(mgr.should_compact(&messages));
    }

    #[test]
    fn below_threshold_does_not_trigger() {
        let mgr = manager(100_000, 0);
        let messages = vec![AgentMessage::user("short message")];
        assert!(!mgr.should_compact(&messages));
    }

    #[tokio::test]
    async fn compact_reduces_below_target() {
        let mgr = manager(200, 0).with_threshold(0.5);
        let messages = vec![
            AgentMessage::system("sys"),
            AgentMessage::user(&"a".repeat(1000)),
            AgentMessage::assistant(&"b".repeat(1000)),
        ];
        let result = mgr.compact(&messages).await.unwrap();
        assert!(estimate_messages(&result) <= estimate_messages(&messages));
    }
}
