//! The `Tool` trait and its supporting types.
//!
//! Every built-in tool (`execute`, `execute_script`, `read`, `write`,
//! `skill`) and every extension tool implements this trait. Shape mirrors
//! the teacher's tool machinery: `name`/`description`/`parameters_schema`
//! for advertising the tool to the adapter, an async `execute`, and a
//! `domain()` classification used by the eligibility/allowed-tools gate.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::abort::AbortSignal;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("aborted")]
    Aborted,

    #[error("tool `{0}` is not in the current allowed-tools set")]
    NotAllowed(String),
}

/// The successful result of a tool invocation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub content: String,
    pub duration: Duration,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>, duration: Duration) -> Self {
        ToolOutput {
            content: content.into(),
            duration,
        }
    }
}

/// Broad classification of a tool's blast radius, used when a skill
/// restricts `allowed_tools` or when introspection needs to group tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolDomain {
    /// Runs inside the host/container filesystem and process space.
    Container,
    /// Reads or writes a file.
    FileSystem,
    /// Performs no side effect observable outside the conversation.
    Pure,
}

/// Sink for streamed output lines, shared (not owned) so the caller can
/// fan a single turn's worth of chunks out to a `tool_execution_update`
/// event without the tool itself knowing about the event bus.
pub type OutputSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Per-call context threaded through every tool execution: the working
/// directory, the scoped environment composed by the caller, the abort
/// signal for the enclosing turn, and an optional streaming output sink.
#[derive(Clone)]
pub struct ToolContext {
    pub cwd: std::path::PathBuf,
    pub env: std::collections::HashMap<String, String>,
    pub abort: AbortSignal,
    pub on_output: Option<OutputSink>,
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("cwd", &self.cwd)
            .field("env", &self.env)
            .field("abort", &self.abort)
            .field("on_output", &self.on_output.is_some())
            .finish()
    }
}

impl ToolContext {
    pub fn new(cwd: std::path::PathBuf, abort: AbortSignal) -> Self {
        ToolContext {
            cwd,
            env: std::collections::HashMap::new(),
            abort,
            on_output: None,
        }
    }

    pub fn with_env(mut self, env: std::collections::HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_on_output(mut self, sink: OutputSink) -> Self {
        self.on_output = Some(sink);
        self
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn domain(&self) -> ToolDomain {
        ToolDomain::Pure
    }

    fn parameters_schema(&self) -> Value;

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError>;

    /// True if the adapter-visible arguments should be sanitised before logging
    /// (e.g. commands that may carry secrets via env substitution).
    fn requires_sanitization(&self) -> bool {
        false
    }
}

/// Extract a required string parameter, producing a uniform error message
/// for every tool rather than each tool hand-rolling its own.
pub fn require_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidParameters(format!("missing required field `{key}`")))
}

pub fn optional_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

pub fn optional_u64(params: &Value, key: &str) -> Option<u64> {
    params.get(key).and_then(Value::as_u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_str_reports_missing_field() {
        let params = serde_json::json!({"other": "x"});
        let err = require_str(&params, "path").unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));
    }

    #[test]
    fn require_str_extracts_value() {
        let params = serde_json::json!({"path": "/tmp/x"});
        assert_eq!(require_str(&params, "path").unwrap(), "/tmp/x");
    }
}
