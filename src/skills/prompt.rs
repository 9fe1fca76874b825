//! Skill prompt formatting.
//!
//! Renders the eligible skill set into system-prompt text. Three formats
//! are supported; structured-tag is the default. When a character budget
//! is supplied, only `name` + `description` are rendered (full content is
//! loaded on demand via the `skill` tool).

use super::Skill;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PromptFormat {
    #[default]
    StructuredTag,
    HeadingPrefixed,
    MachineReadable,
}

/// Render `skills` (already filtered for eligibility and model-invocability)
/// into system-prompt text. `budget` caps the rendered length; when set,
/// only name+description are included.
pub fn format_skills_for_prompt(skills: &[&Skill], format: PromptFormat, budget: Option<usize>) -> String {
    if skills.is_empty() {
        return String::new();
    }

    if let Some(budget) = budget {
        return format_metadata_only(skills, budget);
    }

    match format {
        PromptFormat::StructuredTag => format_structured_tag(skills),
        PromptFormat::HeadingPrefixed => format_heading_prefixed(skills),
        PromptFormat::MachineReadable => format_machine_readable(skills),
    }
}

fn format_structured_tag(skills: &[&Skill]) -> String {
    let mut out = String::from("<available_skills>\n");
    for skill in skills {
        let emoji = skill.metadata.emoji.as_deref().unwrap_or("");
        out.push_str("  <skill>\n");
        out.push_str(&format!("    <name>{}</name>\n", escape_xml(&skill.name)));
        out.push_str(&format!("    <emoji>{}</emoji>\n", escape_xml(emoji)));
        out.push_str(&format!("    <description>{}</description>\n", escape_xml(&skill.description)));
        out.push_str(&format!("    <location>{}</location>\n", escape_xml(&skill.file_path.display().to_string())));
        out.push_str(&format!("    <content>{}</content>\n", escape_xml(&skill.content)));
        out.push_str("  </skill>\n");
    }
    out.push_str("</available_skills>");
    out
}

fn format_heading_prefixed(skills: &[&Skill]) -> String {
    let mut out = String::from("## Available skills\n\n");
    for skill in skills {
        let emoji = skill.metadata.emoji.as_deref().unwrap_or("");
        let prefix = if emoji.is_empty() { String::new() } else { format!("{emoji} ") };
        out.push_str(&format!("## {prefix}{}\n{}\n\n", skill.name, skill.description));
    }
    out.trim_end().to_string()
}

fn format_machine_readable(skills: &[&Skill]) -> String {
    let entries: Vec<serde_json::Value> = skills
        .iter()
        .map(|s| {
            serde_json::json!({
                "name": s.name,
                "description": s.description,
                "location": s.file_path.display().to_string(),
            })
        })
        .collect();
    serde_json::Value::Array(entries).to_string()
}

fn format_metadata_only(skills: &[&Skill], budget: usize) -> String {
    let mut out = String::from("<available_skills>\n");
    for skill in skills {
        let fragment = format!(
            "  <skill><name>{}</name><description>{}</description></skill>\n",
            escape_xml(&skill.name),
            escape_xml(&skill.description)
        );
        if out.len() + fragment.len() + "</available_skills>".len() > budget {
            break;
        }
        out.push_str(&fragment);
    }
    out.push_str("</available_skills>");
    out
}

fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::{SkillMetadata, SkillSource};

    fn skill(name: &str, description: &str) -> Skill {
        Skill {
            name: name.to_string(),
            description: description.to_string(),
            content: format!("Body for {name}."),
            file_path: format!("/skills/{name}/SKILL.md").into(),
            base_dir: format!("/skills/{name}").into(),
            source: SkillSource::Workspace,
            metadata: SkillMetadata::default(),
        }
    }

    #[test]
    fn empty_list_yields_empty_prompt() {
        assert_eq!(format_skills_for_prompt(&[], PromptFormat::StructuredTag, None), "");
    }

    #[test]
    fn structured_tag_contains_required_fields() {
        let mut s = skill("github", "talk to github");
        s.metadata.emoji = Some("🐙".to_string());
        let out = format_skills_for_prompt(&[&s], PromptFormat::StructuredTag, None);
        assert!(out.contains("<name>github</name>"));
        assert!(out.contains("<emoji>🐙</emoji>"));
        assert!(out.contains("<description>talk to github</description>"));
        assert!(out.contains("<location>"));
        assert!(out.contains("<content>Body for github.</content>"));
    }

    #[test]
    fn escapes_special_characters() {
        let s = skill("x", "a < b & c");
        let out = format_skills_for_prompt(&[&s], PromptFormat::StructuredTag, None);
        assert!(out.contains("a &lt; b &amp; c"));
    }

    #[test]
    fn heading_prefixed_uses_markdown_headers() {
        let s = skill("deploy", "ship it");
        let out = format_skills_for_prompt(&[&s], PromptFormat::HeadingPrefixed, None);
        assert!(out.starts_with("## Available skills"));
        assert!(out.contains("## deploy"));
    }

    #[test]
    fn machine_readable_is_valid_json_array() {
        let s = skill("demo", "d");
        let out = format_skills_for_prompt(&[&s], PromptFormat::MachineReadable, None);
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert!(parsed.is_array());
        assert_eq!(parsed[0]["name"], "demo");
    }

    #[test]
    fn budget_truncates_and_drops_content() {
        let skills: Vec<Skill> = (0..50).map(|i| skill(&format!("skill-{i}"), "a reasonably long description of what this does")).collect();
        let refs: Vec<&Skill> = skills.iter().collect();
        let out = format_skills_for_prompt(&refs, PromptFormat::StructuredTag, Some(200));
        assert!(out.len() <= 260);
        assert!(!out.contains("skill-49"));
    }
}
