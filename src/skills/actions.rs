//! Deterministic named skill actions.
//!
//! A skill's `actions` front-matter map exposes schema-typed sub-operations
//! backed by a script relative to the skill's base directory, invoked by
//! name independent of free-form model prompting.

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;

use super::{ActionOutput, Skill};
use crate::abort::AbortSignal;
use crate::tools::runtime::{self, ExecuteOptions};

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("skill `{skill}` has no action named `{action}`")]
    UnknownAction { skill: String, action: String },

    #[error("missing required param `{0}` for action")]
    MissingParam(String),

    #[error("action script failed: {0}")]
    ExecutionFailed(String),

    #[error("action output was not valid JSON: {0}")]
    InvalidJson(String),
}

/// Result of an action invocation: either raw text or a parsed JSON value,
/// per the action's declared `output` kind.
pub enum ActionResult {
    Text(String),
    Json(serde_json::Value),
}

const ACTION_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn run_action(
    skill: &Skill,
    action_name: &str,
    params: &HashMap<String, String>,
    abort: AbortSignal,
) -> Result<ActionResult, ActionError> {
    let spec = skill.metadata.actions.get(action_name).ok_or_else(|| ActionError::UnknownAction {
        skill: skill.name.clone(),
        action: action_name.to_string(),
    })?;

    for required in &spec.params {
        if !params.contains_key(required) {
            return Err(ActionError::MissingParam(required.clone()));
        }
    }

    let script_path = skill.base_dir.join(&spec.script);
    let mut env: HashMap<String, String> = HashMap::new();
    for (k, v) in params {
        env.insert(format!("ARG_{}", k.to_uppercase()), v.clone());
    }

    let result = runtime::execute(
        &script_path.display().to_string(),
        ExecuteOptions {
            cwd: Some(skill.base_dir.as_path()),
            env,
            timeout: ACTION_TIMEOUT,
            on_output: None,
            abort,
        },
    )
    .await;

    if !result.success {
        return Err(ActionError::ExecutionFailed(result.error.unwrap_or(result.output)));
    }

    match spec.output {
        ActionOutput::Text => Ok(ActionResult::Text(result.output)),
        ActionOutput::Json => {
            let value = serde_json::from_str(&result.output).map_err(|e| ActionError::InvalidJson(e.to_string()))?;
            Ok(ActionResult::Json(value))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abort::AbortHandle;
    use crate::skills::{SkillMetadata, SkillSource};
    use std::fs;

    fn skill_with_action(dir: &std::path::Path, output: ActionOutput) -> Skill {
        let script = dir.join("run.sh");
        let body = match output {
            ActionOutput::Text => "#!/bin/sh\necho hello-$ARG_NAME",
            ActionOutput::Json => "#!/bin/sh\necho '{\"ok\": true}'",
        };
        fs::write(&script, body).unwrap();
        let mut perms = fs::metadata(&script).unwrap().permissions();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            perms.set_mode(0o755);
        }
        fs::set_permissions(&script, perms).unwrap();

        let mut metadata = SkillMetadata::default();
        metadata.actions.insert(
            "greet".to_string(),
            super::super::ActionSpec { script: "run.sh".to_string(), output, params: vec!["name".to_string()] },
        );

        Skill {
            name: "demo".into(),
            description: "d".into(),
            content: String::new(),
            file_path: dir.join("SKILL.md"),
            base_dir: dir.to_path_buf(),
            source: SkillSource::Workspace,
            metadata,
        }
    }

    #[tokio::test]
    async fn unknown_action_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let skill = skill_with_action(tmp.path(), ActionOutput::Text);
        let (_h, signal) = AbortHandle::new();
        let err = run_action(&skill, "nonexistent", &HashMap::new(), signal).await.unwrap_err();
        assert!(matches!(err, ActionError::UnknownAction { .. }));
    }

    #[tokio::test]
    async fn missing_param_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let skill = skill_with_action(tmp.path(), ActionOutput::Text);
        let (_h, signal) = AbortHandle::new();
        let err = run_action(&skill, "greet", &HashMap::new(), signal).await.unwrap_err();
        assert!(matches!(err, ActionError::MissingParam(_)));
    }

    #[tokio::test]
    async fn text_action_runs_script() {
        let tmp = tempfile::tempdir().unwrap();
        let skill = skill_with_action(tmp.path(), ActionOutput::Text);
        let (_h, signal) = AbortHandle::new();
        let mut params = HashMap::new();
        params.insert("name".to_string(), "world".to_string());
        let result = run_action(&skill, "greet", &params, signal).await.unwrap();
        match result {
            ActionResult::Text(t) => assert!(t.contains("hello-world")),
            _ => panic!("expected text result"),
        }
    }

    #[tokio::test]
    async fn json_action_parses_output() {
        let tmp = tempfile::tempdir().unwrap();
        let skill = skill_with_action(tmp.path(), ActionOutput::Json);
        let (_h, signal) = AbortHandle::new();
        let mut params = HashMap::new();
        params.insert("name".to_string(), "x".to_string());
        let result = run_action(&skill, "greet", &params, signal).await.unwrap();
        match result {
            ActionResult::Json(v) => assert_eq!(v["ok"], true),
            _ => panic!("expected json result"),
        }
    }
}
