//! YAML front-matter parsing for `SKILL.md` files.
//!
//! Front matter is delimited by a `---` line at the very start of the file
//! and a matching `---` line that closes it; everything after the closing
//! delimiter is the skill's prompt content.

use std::collections::HashMap;

use serde::Deserialize;

use super::{ActionSpec, SkillMetadata, SkillRequirements};

#[derive(Debug, Deserialize, Default)]
struct RawFrontMatter {
    name: Option<String>,
    description: Option<String>,
    model: Option<String>,
    context: Option<String>,
    #[serde(rename = "allowed-tools", alias = "allowed_tools")]
    allowed_tools: Option<Vec<String>>,
    #[serde(rename = "argument-hint", alias = "argument_hint")]
    argument_hint: Option<String>,
    #[serde(rename = "user-invocable", alias = "user_invocable", default = "default_true")]
    user_invocable: bool,
    #[serde(rename = "disable-model-invocation", alias = "disable_model_invocation", default)]
    disable_model_invocation: bool,
    #[serde(default)]
    metadata: RawMetadataBlock,
    #[serde(default)]
    actions: HashMap<String, ActionSpec>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Default)]
struct RawMetadataBlock {
    #[serde(default)]
    always: bool,
    emoji: Option<String>,
    homepage: Option<String>,
    primary_env: Option<String>,
    skill_key: Option<String>,
    #[serde(default)]
    requires: RawRequirements,
    #[serde(default)]
    hooks: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawRequirements {
    #[serde(default)]
    bins: Vec<String>,
    #[serde(default)]
    any_bins: Vec<String>,
    #[serde(default)]
    env: Vec<String>,
    #[serde(default)]
    os: Vec<String>,
}

/// A front-matter + content parse error. The loader fills in the
/// originating path before surfacing it.
#[derive(Debug, Clone)]
pub struct FrontMatterError {
    pub reason: String,
}

impl FrontMatterError {
    fn new(reason: impl Into<String>) -> Self {
        FrontMatterError { reason: reason.into() }
    }
}

pub struct ParsedSkillFile {
    pub name: Option<String>,
    pub description: Option<String>,
    pub content: String,
    pub metadata: SkillMetadata,
}

/// Parse a whole `SKILL.md` file's text into front matter + body.
pub fn parse_frontmatter(text: &str) -> Result<ParsedSkillFile, FrontMatterError> {
    let (yaml, content) = split_frontmatter(text)?;

    let raw: RawFrontMatter = serde_yaml::from_str(yaml)
        .map_err(|e| FrontMatterError::new(format!("invalid YAML front matter: {e}")))?;

    let metadata = SkillMetadata {
        model: raw.model,
        context: raw.context.as_deref().unwrap_or("inline").parse().unwrap_or_default(),
        allowed_tools: raw.allowed_tools.unwrap_or_default(),
        argument_hint: raw.argument_hint,
        user_invocable: raw.user_invocable,
        disable_model_invocation: raw.disable_model_invocation,
        always: raw.metadata.always,
        emoji: raw.metadata.emoji,
        homepage: raw.metadata.homepage,
        primary_env: raw.metadata.primary_env,
        skill_key: raw.metadata.skill_key,
        hooks: raw.metadata.hooks,
        requires: SkillRequirements {
            bins: raw.metadata.requires.bins,
            any_bins: raw.metadata.requires.any_bins,
            env: raw.metadata.requires.env,
            os: raw.metadata.requires.os,
        },
        actions: raw.actions,
    };

    Ok(ParsedSkillFile {
        name: raw.name,
        description: raw.description,
        content,
        metadata,
    })
}

/// Splits `---\n<yaml>\n---\n<content>` into its two halves. Requires the
/// opening delimiter on the very first line.
fn split_frontmatter(text: &str) -> Result<(&str, String), FrontMatterError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let rest = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))
        .ok_or_else(|| FrontMatterError::new("missing opening `---` front-matter delimiter"))?;

    let mut search_from = 0;
    loop {
        let idx = rest[search_from..].find("\n---").map(|i| i + search_from);
        let Some(idx) = idx else {
            return Err(FrontMatterError::new("missing closing `---` front-matter delimiter"));
        };
        let after_marker = &rest[idx + 4..];
        let closes_cleanly = after_marker.is_empty()
            || after_marker.starts_with('\n')
            || after_marker.starts_with("\r\n");
        if closes_cleanly {
            let yaml = &rest[..idx];
            let content = after_marker.trim_start_matches("\r\n").trim_start_matches('\n');
            return Ok((yaml, content.to_string()));
        }
        search_from = idx + 4;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_frontmatter() {
        let text = "---\nname: demo\ndescription: a demo skill\n---\nHello $ARGUMENTS\n";
        let parsed = parse_frontmatter(text).unwrap();
        assert_eq!(parsed.name.as_deref(), Some("demo"));
        assert_eq!(parsed.description.as_deref(), Some("a demo skill"));
        assert_eq!(parsed.content, "Hello $ARGUMENTS\n");
        assert!(parsed.metadata.user_invocable);
    }

    #[test]
    fn parses_nested_metadata_block() {
        let text = "---\nname: demo\ndescription: d\nmetadata:\n  emoji: \"🔧\"\n  primary_env: DEMO_KEY\n  requires:\n    bins: [git, curl]\n    os: [linux, darwin]\n---\nbody\n";
        let parsed = parse_frontmatter(text).unwrap();
        assert_eq!(parsed.metadata.emoji.as_deref(), Some("🔧"));
        assert_eq!(parsed.metadata.primary_env.as_deref(), Some("DEMO_KEY"));
        assert_eq!(parsed.metadata.requires.bins, vec!["git", "curl"]);
        assert_eq!(parsed.metadata.requires.os, vec!["linux", "darwin"]);
    }

    #[test]
    fn missing_frontmatter_is_an_error() {
        let err = parse_frontmatter("just a plain file\n").unwrap_err();
        assert!(err.reason.contains("opening"));
    }

    #[test]
    fn unclosed_frontmatter_is_an_error() {
        let err = parse_frontmatter("---\nname: demo\n").unwrap_err();
        assert!(err.reason.contains("closing"));
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        let text = "---\nname: [unterminated\n---\nbody\n";
        let err = parse_frontmatter(text).unwrap_err();
        assert!(err.reason.contains("YAML"));
    }

    #[test]
    fn always_flag_and_context_fork_parse() {
        let text = "---\nname: demo\ndescription: d\ncontext: fork\nallowed-tools: [read, write]\n---\nbody\n";
        let parsed = parse_frontmatter(text).unwrap();
        assert_eq!(parsed.metadata.context, super::super::SkillContext::Fork);
        assert_eq!(parsed.metadata.allowed_tools, vec!["read", "write"]);
    }
}
