//! Tool registry and dispatch.

pub mod builtin;
pub mod runtime;
pub mod tool;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::adapter::ToolSchema;
pub use tool::{require_str, Tool, ToolContext, ToolDomain, ToolError, ToolOutput};

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Schemas for every registered tool, or for `allowed` only when a
    /// skill has restricted the active tool set.
    pub fn schemas(&self, allowed: Option<&[String]>) -> Vec<ToolSchema> {
        self.tools
            .values()
            .filter(|t| allowed.map(|a| a.iter().any(|n| n == t.name())).unwrap_or(true))
            .map(|t| ToolSchema { name: t.name().to_string(), description: t.description().to_string(), parameters: t.parameters_schema() })
            .collect()
    }

    /// Populated with the built-in tools: `execute`, `execute_script`, `read`, `write`.
    /// The `skill` tool is registered separately by the agent loop, since it
    /// needs a reference to the current `SkillEngine`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(builtin::ExecuteTool));
        registry.register(Arc::new(builtin::ExecuteScriptTool));
        registry.register(Arc::new(builtin::ReadFileTool));
        registry.register(Arc::new(builtin::WriteFileTool));
        registry
    }
}

/// Dispatch `name(params)` against `registry`, honouring an active
/// `allowed_tools` restriction when one is set.
pub async fn dispatch(
    registry: &ToolRegistry,
    name: &str,
    params: Value,
    ctx: &ToolContext,
    allowed_tools: Option<&[String]>,
) -> Result<ToolOutput, ToolError> {
    if let Some(allowed) = allowed_tools {
        if !allowed.iter().any(|n| n == name) {
            return Err(ToolError::NotAllowed(name.to_string()));
        }
    }

    let tool = registry.get(name).ok_or_else(|| ToolError::ExecutionFailed(format!("unknown tool `{name}`")))?;
    tool.execute(params, ctx).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abort::AbortHandle;

    fn ctx() -> ToolContext {
        let (_h, signal) = AbortHandle::new();
        ToolContext::new(std::env::temp_dir(), signal)
    }

    #[tokio::test]
    async fn dispatch_runs_a_registered_tool() {
        let registry = ToolRegistry::with_builtins();
        let output = dispatch(&registry, "execute", serde_json::json!({"command": "echo hi"}), &ctx(), None)
            .await
            .unwrap();
        assert!(output.content.contains("hi"));
    }

    #[tokio::test]
    async fn dispatch_rejects_tool_outside_allowed_set() {
        let registry = ToolRegistry::with_builtins();
        let allowed = vec!["read".to_string()];
        let err = dispatch(&registry, "execute", serde_json::json!({"command": "echo hi"}), &ctx(), Some(&allowed))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotAllowed(_)));
    }

    #[tokio::test]
    async fn dispatch_rejects_unknown_tool() {
        let registry = ToolRegistry::with_builtins();
        let err = dispatch(&registry, "nonexistent", serde_json::json!({}), &ctx(), None).await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed(_)));
    }

    #[test]
    fn schemas_filters_by_allowed_list() {
        let registry = ToolRegistry::with_builtins();
        let allowed = vec!["read".to_string(), "write".to_string()];
        let schemas = registry.schemas(Some(&allowed));
        assert_eq!(schemas.len(), 2);
        assert!(schemas.iter().all(|s| s.name == "read" || s.name == "write"));
    }
}
