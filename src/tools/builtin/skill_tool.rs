//! The `skill` built-in tool: on-demand full-content loader for a named
//! skill, with placeholder resolution. Forking (when a skill declares
//! `context: fork`) is handled by the agent loop, not this tool — see
//! `ForkExecutor`.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::placeholder::resolve_content;
use crate::skills::SkillEngine;
use crate::tools::tool::{optional_str, require_str, Tool, ToolContext, ToolDomain, ToolError, ToolOutput};

/// Implemented by the agent loop so the `skill` tool can hand off to a
/// child agent run for `context: fork` skills without this module
/// depending on the agent crate module.
#[async_trait]
pub trait ForkExecutor: Send + Sync {
    async fn run_fork(&self, skill_name: &str, arguments: &str) -> Result<String, ToolError>;
}

pub struct SkillTool {
    engine: Arc<SkillEngine>,
    fork: Arc<dyn ForkExecutor>,
}

impl SkillTool {
    pub fn new(engine: Arc<SkillEngine>, fork: Arc<dyn ForkExecutor>) -> Self {
        SkillTool { engine, fork }
    }
}

#[async_trait]
impl Tool for SkillTool {
    fn name(&self) -> &str {
        "skill"
    }

    fn description(&self) -> &str {
        "Load the full content of a named skill, resolving its placeholders. \
         Skills declaring `context: fork` run as an isolated child agent instead."
    }

    fn domain(&self) -> ToolDomain {
        ToolDomain::Pure
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Skill name"},
                "arguments": {"type": "string", "description": "Argument string passed to the skill"}
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let name = require_str(&params, "name")?;
        let arguments = optional_str(&params, "arguments").unwrap_or("");

        let snapshot = self.engine.current();
        let skill = snapshot
            .find(name)
            .ok_or_else(|| ToolError::InvalidParameters(format!("unknown or ineligible skill `{name}`")))?;

        if skill.metadata.context == crate::skills::SkillContext::Fork {
            let result = self.fork.run_fork(name, arguments).await?;
            return Ok(ToolOutput::text(result, start.elapsed()));
        }

        let resolved = resolve_content(&skill.content, arguments).await;
        Ok(ToolOutput::text(resolved, start.elapsed()))
    }
}
