//! `execute` and `execute_script` built-in tools: run a shell command or a
//! multi-line script body through the tool execution runtime.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tools::runtime::{self, ExecuteOptions};
use crate::tools::tool::{require_str, optional_u64, Tool, ToolContext, ToolDomain, ToolError, ToolOutput};

const DEFAULT_TIMEOUT_SECS: u64 = 120;

pub struct ExecuteTool;

#[async_trait]
impl Tool for ExecuteTool {
    fn name(&self) -> &str {
        "execute"
    }

    fn description(&self) -> &str {
        "Run a shell command and return its combined stdout/stderr."
    }

    fn domain(&self) -> ToolDomain {
        ToolDomain::Container
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "description": "Shell command to run"},
                "timeout": {"type": "integer", "description": "Timeout in seconds"},
                "cwd": {"type": "string", "description": "Working directory"}
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let command = require_str(&params, "command")?;
        let timeout = Duration::from_secs(optional_u64(&params, "timeout").unwrap_or(DEFAULT_TIMEOUT_SECS));
        let cwd = params.get("cwd").and_then(Value::as_str).map(std::path::Path::new);

        let result = runtime::execute(
            command,
            ExecuteOptions {
                cwd: cwd.or(Some(ctx.cwd.as_path())),
                env: ctx.env.clone(),
                timeout,
                on_output: sink_from(ctx),
                abort: ctx.abort.clone(),
            },
        )
        .await;

        if result.success {
            Ok(ToolOutput::text(result.output, start.elapsed()))
        } else {
            Err(ToolError::ExecutionFailed(format!(
                "{}\n{}",
                result.error.unwrap_or_default(),
                result.output
            )))
        }
    }
}

/// Adapt the tool context's shared `Fn` sink to the runtime's `FnMut` sink.
fn sink_from<'a>(ctx: &ToolContext) -> Option<runtime::OutputSink<'a>> {
    ctx.on_output.clone().map(|sink| -> runtime::OutputSink<'a> { Box::new(move |line: &str| sink(line)) })
}

pub struct ExecuteScriptTool;

#[async_trait]
impl Tool for ExecuteScriptTool {
    fn name(&self) -> &str {
        "execute_script"
    }

    fn description(&self) -> &str {
        "Run a multi-line script body (written to a scratch file) and return its output."
    }

    fn domain(&self) -> ToolDomain {
        ToolDomain::Container
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "script": {"type": "string", "description": "Script body"},
                "timeout": {"type": "integer", "description": "Timeout in seconds"},
                "cwd": {"type": "string", "description": "Working directory"}
            },
            "required": ["script"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let script = require_str(&params, "script")?;
        let timeout = Duration::from_secs(optional_u64(&params, "timeout").unwrap_or(DEFAULT_TIMEOUT_SECS));
        let cwd = params.get("cwd").and_then(Value::as_str).map(std::path::Path::new);

        let result = runtime::execute_script(
            script,
            ExecuteOptions {
                cwd: cwd.or(Some(ctx.cwd.as_path())),
                env: ctx.env.clone(),
                timeout,
                on_output: sink_from(ctx),
                abort: ctx.abort.clone(),
            },
        )
        .await;

        if result.success {
            Ok(ToolOutput::text(result.output, start.elapsed()))
        } else {
            Err(ToolError::ExecutionFailed(format!(
                "{}\n{}",
                result.error.unwrap_or_default(),
                result.output
            )))
        }
    }
}
