//! Built-in tools: `execute`, `execute_script`, `read`, `write`, `skill`.
//!
//! The `skill` tool is assembled separately by the agent loop since it
//! needs a live `SkillEngine` and a `ForkExecutor`; see `skill_tool`.

mod execute;
mod file;
pub mod skill_tool;

pub use execute::{ExecuteScriptTool, ExecuteTool};
pub use file::{ReadFileTool, WriteFileTool};
pub use skill_tool::{ForkExecutor, SkillTool};
