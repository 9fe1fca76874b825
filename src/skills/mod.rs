//! Agent Skills infrastructure.
//!
//! Skills are modular capability bundles — a directory containing a
//! `SKILL.md` file with YAML front matter (name, description, metadata)
//! plus optional action scripts. They teach the agent **how** and **when**
//! to use tools for a specific domain.
//!
//! Only name + description are loaded into the system prompt by default
//! (progressive disclosure); full content is loaded on demand via the
//! `skill` tool when a task matches a skill's description.
//!
//! # Skill sources (precedence: later wins on name collision)
//!
//! extra < bundled < claude < cursor < managed < workspace

pub mod actions;
mod eligibility;
mod frontmatter;
mod loader;
mod prompt;
mod snapshot;
pub mod watcher;

pub use actions::{run_action, ActionError};
pub use eligibility::{should_include_skill, EligibilityProbe, EligibilityVerdict};
pub use frontmatter::{parse_frontmatter, FrontMatterError};
pub use loader::{load_skills, resolve_bundled_skills_dir, LoadOutcome, LoaderError, SkillLoadOptions};
pub use prompt::{format_skills_for_prompt, PromptFormat};
pub use snapshot::{build_skill_snapshot, SkillEngine};

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Where a skill was discovered. Later variants in load order win on a
/// name collision; `Extra` is lowest precedence, `Workspace` highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillSource {
    Extra,
    Bundled,
    Claude,
    Cursor,
    Managed,
    Workspace,
}

impl SkillSource {
    /// Fixed load order; index doubles as precedence rank.
    pub const ORDER: [SkillSource; 6] = [
        SkillSource::Extra,
        SkillSource::Bundled,
        SkillSource::Claude,
        SkillSource::Cursor,
        SkillSource::Managed,
        SkillSource::Workspace,
    ];
}

/// Whether a skill's content is appended to the current conversation
/// (`Inline`) or run as an isolated child agent with fresh history (`Fork`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillContext {
    #[default]
    Inline,
    Fork,
}

impl FromStr for SkillContext {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inline" => Ok(SkillContext::Inline),
            "fork" => Ok(SkillContext::Fork),
            _ => Err(()),
        }
    }
}

/// Environment/binary requirements gating a skill's eligibility.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillRequirements {
    #[serde(default)]
    pub bins: Vec<String>,
    #[serde(default)]
    pub any_bins: Vec<String>,
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub os: Vec<String>,
}

/// A deterministic named sub-operation a skill exposes independent of
/// free-form model prompting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSpec {
    pub script: String,
    #[serde(default)]
    pub output: ActionOutput,
    #[serde(default)]
    pub params: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionOutput {
    #[default]
    Text,
    Json,
}

/// Parsed front-matter metadata for a skill.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillMetadata {
    pub model: Option<String>,
    #[serde(default)]
    pub context: SkillContext,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    pub argument_hint: Option<String>,
    #[serde(default = "default_true")]
    pub user_invocable: bool,
    #[serde(default)]
    pub disable_model_invocation: bool,
    /// Bypasses every other eligibility check when true.
    #[serde(default)]
    pub always: bool,
    pub emoji: Option<String>,
    pub homepage: Option<String>,
    pub primary_env: Option<String>,
    /// Overrides the skill's per-skill config lookup key (defaults to `name`).
    pub skill_key: Option<String>,
    #[serde(default)]
    pub hooks: HashMap<String, String>,
    #[serde(default)]
    pub requires: SkillRequirements,
    #[serde(default)]
    pub actions: HashMap<String, ActionSpec>,
}

fn default_true() -> bool {
    true
}

/// A loaded, immutable skill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    pub description: String,
    pub content: String,
    pub file_path: PathBuf,
    pub base_dir: PathBuf,
    pub source: SkillSource,
    pub metadata: SkillMetadata,
}

impl Skill {
    pub fn disable_model_invocation(&self) -> bool {
        self.metadata.disable_model_invocation
    }

    pub fn config_key(&self) -> &str {
        self.metadata.skill_key.as_deref().unwrap_or(&self.name)
    }
}

/// Validates a skill name: lowercase alphanumerics and hyphens, no leading
/// hyphen, 1-64 characters.
pub fn is_valid_skill_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 64 {
        return false;
    }
    let mut chars = name.chars();
    let Some(first) = chars.next() else { return false };
    if !(first.is_ascii_lowercase() || first.is_ascii_digit()) {
        return false;
    }
    name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

pub const MAX_DESCRIPTION_LEN: usize = 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_validation_boundaries() {
        assert!(is_valid_skill_name(&"a".repeat(64)));
        assert!(!is_valid_skill_name(&"a".repeat(65)));
        assert!(is_valid_skill_name("git-hub-2"));
        assert!(!is_valid_skill_name("-leading-hyphen"));
        assert!(!is_valid_skill_name("Has-Upper"));
        assert!(!is_valid_skill_name(""));
    }

    #[test]
    fn source_order_is_extra_to_workspace() {
        assert_eq!(SkillSource::ORDER[0], SkillSource::Extra);
        assert_eq!(SkillSource::ORDER[5], SkillSource::Workspace);
    }
}
