//! `read` and `write` built-in tools.

use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tools::tool::{optional_u64, require_str, Tool, ToolContext, ToolDomain, ToolError, ToolOutput};

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read"
    }

    fn description(&self) -> &str {
        "Read a UTF-8 text file, optionally a line range."
    }

    fn domain(&self) -> ToolDomain {
        ToolDomain::FileSystem
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "offset": {"type": "integer", "description": "0-based starting line"},
                "limit": {"type": "integer", "description": "Maximum number of lines"}
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let path = require_str(&params, "path")?;
        let resolved = resolve(ctx, path);

        let content = std::fs::read_to_string(&resolved)
            .map_err(|e| ToolError::ExecutionFailed(format!("failed to read {}: {e}", resolved.display())))?;

        let offset = optional_u64(&params, "offset").unwrap_or(0) as usize;
        let limit = optional_u64(&params, "limit").map(|v| v as usize);

        let selected: String = match limit {
            Some(limit) => content.lines().skip(offset).take(limit).collect::<Vec<_>>().join("\n"),
            None if offset == 0 => content,
            None => content.lines().skip(offset).collect::<Vec<_>>().join("\n"),
        };

        Ok(ToolOutput::text(selected, start.elapsed()))
    }
}

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write"
    }

    fn description(&self) -> &str {
        "Write text content to a file, creating parent directories as needed."
    }

    fn domain(&self) -> ToolDomain {
        ToolDomain::FileSystem
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "content": {"type": "string"}
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let path = require_str(&params, "path")?;
        let content = require_str(&params, "content")?;
        let resolved = resolve(ctx, path);

        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ToolError::ExecutionFailed(format!("failed to create {}: {e}", parent.display())))?;
        }
        std::fs::write(&resolved, content)
            .map_err(|e| ToolError::ExecutionFailed(format!("failed to write {}: {e}", resolved.display())))?;

        Ok(ToolOutput::text(format!("wrote {} bytes to {}", content.len(), resolved.display()), start.elapsed()))
    }
}

fn resolve(ctx: &ToolContext, path: &str) -> std::path::PathBuf {
    let p = std::path::Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        ctx.cwd.join(p)
    }
}
