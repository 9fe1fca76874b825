//! Crate-wide error type.
//!
//! Mirrors the error *kinds* the engine must distinguish: skill load
//! failures, adapter protocol errors (transient vs not), tool failures,
//! abort, timeout, and configuration errors. Configuration errors are
//! fatal at startup and never raised mid-turn.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("skill load error at {path}: {reason}")]
    SkillLoad { path: PathBuf, reason: String },

    #[error("adapter error: {message}")]
    Adapter { message: String, transient: bool },

    #[error("tool error: {0}")]
    Tool(String),

    #[error("aborted")]
    Abort,

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl AgentError {
    pub fn skill_load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        AgentError::SkillLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn adapter(message: impl Into<String>, transient: bool) -> Self {
        AgentError::Adapter {
            message: message.into(),
            transient,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        AgentError::Config(message.into())
    }

    /// Whether retrying the operation that produced this error is worthwhile.
    pub fn is_transient(&self) -> bool {
        matches!(self, AgentError::Adapter { transient: true, .. } | AgentError::Timeout(_))
    }
}
