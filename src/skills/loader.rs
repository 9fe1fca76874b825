//! Skill discovery and loading.
//!
//! Walks each configured root, parses every `SKILL.md` found, and reports
//! a `LoaderError` (path + reason) for any skill that fails validation —
//! the offending skill is skipped, everything else loads normally.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::frontmatter::parse_frontmatter;
use super::{is_valid_skill_name, Skill, SkillSource, MAX_DESCRIPTION_LEN};

#[derive(Debug, Clone)]
pub struct LoaderError {
    pub path: PathBuf,
    pub reason: String,
}

pub struct SkillLoadOptions {
    pub bundled_dir: Option<PathBuf>,
    pub managed_dir: Option<PathBuf>,
    pub workspace_dir: Option<PathBuf>,
    pub extra_dirs: Vec<PathBuf>,
    pub include_claude_skills: bool,
    pub include_cursor_skills: bool,
}

impl Default for SkillLoadOptions {
    fn default() -> Self {
        SkillLoadOptions {
            bundled_dir: resolve_bundled_skills_dir(),
            managed_dir: dirs::home_dir().map(|h| h.join(".agent-core").join("skills")),
            workspace_dir: None,
            extra_dirs: Vec::new(),
            include_claude_skills: true,
            include_cursor_skills: true,
        }
    }
}

pub struct LoadOutcome {
    pub skills: Vec<Skill>,
    pub errors: Vec<LoaderError>,
}

/// Resolve the directory bundled with the running binary, if any.
pub fn resolve_bundled_skills_dir() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let dir = exe.parent()?.join("skills");
    if dir.is_dir() {
        Some(dir)
    } else {
        None
    }
}

/// Load skills from every configured root, merging by the fixed precedence
/// order (later sources overwrite earlier ones on name collision).
pub fn load_skills(opts: &SkillLoadOptions) -> LoadOutcome {
    let mut by_name: std::collections::BTreeMap<String, Skill> = std::collections::BTreeMap::new();
    let mut errors = Vec::new();

    let mut roots: Vec<(SkillSource, PathBuf)> = Vec::new();
    roots.extend(opts.extra_dirs.iter().cloned().map(|d| (SkillSource::Extra, d)));
    if let Some(d) = &opts.bundled_dir {
        roots.push((SkillSource::Bundled, d.clone()));
    }
    if opts.include_claude_skills {
        if let Some(home) = dirs::home_dir() {
            roots.push((SkillSource::Claude, home.join(".claude").join("skills")));
        }
    }
    if opts.include_cursor_skills {
        if let Some(home) = dirs::home_dir() {
            roots.push((SkillSource::Cursor, home.join(".cursor").join("skills")));
        }
    }
    if let Some(d) = &opts.managed_dir {
        roots.push((SkillSource::Managed, d.clone()));
    }
    if let Some(d) = &opts.workspace_dir {
        roots.push((SkillSource::Workspace, d.clone()));
    }

    for (source, root) in roots {
        if !root.is_dir() {
            continue;
        }
        let found = load_skills_from_dir(&root, source, &mut errors);
        for skill in found {
            if by_name.contains_key(&skill.name) {
                debug!(name = %skill.name, "skill name collision, later source wins");
            }
            by_name.insert(skill.name.clone(), skill);
        }
    }

    let mut skills: Vec<Skill> = by_name.into_values().collect();
    skills.sort_by(|a, b| a.name.cmp(&b.name));

    LoadOutcome { skills, errors }
}

/// Recursively load every `SKILL.md` under `root`, attributing each to `source`.
pub fn load_skills_from_dir(root: &Path, source: SkillSource, errors: &mut Vec<LoaderError>) -> Vec<Skill> {
    let mut out = Vec::new();
    visit(root, source, &mut out, errors);
    out.sort_by(|a: &Skill, b: &Skill| a.file_path.cmp(&b.file_path));
    out
}

fn visit(dir: &Path, source: SkillSource, out: &mut Vec<Skill>, errors: &mut Vec<LoaderError>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let mut entries: Vec<_> = entries.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let file_name = entry.file_name();
        let name_str = file_name.to_string_lossy();

        if name_str.starts_with('.') || name_str == "node_modules" || name_str == "target" {
            continue;
        }

        if path.is_dir() {
            let skill_md = path.join("SKILL.md");
            if skill_md.is_file() {
                if let Some(skill) = load_skill_from_file(&skill_md, &path, source, errors) {
                    out.push(skill);
                }
            } else {
                visit(&path, source, out, errors);
            }
        }
    }
}

fn load_skill_from_file(
    file_path: &Path,
    base_dir: &Path,
    source: SkillSource,
    errors: &mut Vec<LoaderError>,
) -> Option<Skill> {
    let text = match std::fs::read_to_string(file_path) {
        Ok(t) => t,
        Err(e) => {
            errors.push(LoaderError { path: file_path.to_path_buf(), reason: format!("failed to read file: {e}") });
            return None;
        }
    };

    let parsed = match parse_frontmatter(&text) {
        Ok(p) => p,
        Err(e) => {
            errors.push(LoaderError { path: file_path.to_path_buf(), reason: e.reason });
            return None;
        }
    };

    let name = parsed.name.unwrap_or_else(|| {
        base_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    });

    if !is_valid_skill_name(&name) {
        errors.push(LoaderError {
            path: file_path.to_path_buf(),
            reason: format!("invalid skill name `{name}`"),
        });
        return None;
    }

    let Some(description) = parsed.description else {
        errors.push(LoaderError { path: file_path.to_path_buf(), reason: "missing required `description`".into() });
        return None;
    };

    if description.is_empty() || description.len() > MAX_DESCRIPTION_LEN {
        errors.push(LoaderError {
            path: file_path.to_path_buf(),
            reason: format!("description length {} exceeds {MAX_DESCRIPTION_LEN} characters", description.len()),
        });
        return None;
    }

    if description.len() > 400 {
        warn!(skill = %name, len = description.len(), "skill description is unusually long");
    }

    Some(Skill {
        name,
        description,
        content: parsed.content,
        file_path: file_path.to_path_buf(),
        base_dir: base_dir.to_path_buf(),
        source,
        metadata: parsed.metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_skill(dir: &Path, name: &str, body: &str) {
        let skill_dir = dir.join(name);
        fs::create_dir_all(&skill_dir).unwrap();
        fs::write(skill_dir.join("SKILL.md"), body).unwrap();
    }

    #[test]
    fn loads_valid_skill() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "demo", "---\nname: demo\ndescription: a demo\n---\nbody\n");

        let mut errors = Vec::new();
        let skills = load_skills_from_dir(tmp.path(), SkillSource::Workspace, &mut errors);
        assert_eq!(skills.len(), 1);
        assert!(errors.is_empty());
        assert_eq!(skills[0].name, "demo");
    }

    #[test]
    fn invalid_skill_is_skipped_with_reported_error() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "bad", "no frontmatter here\n");
        write_skill(tmp.path(), "good", "---\nname: good\ndescription: fine\n---\nbody\n");

        let mut errors = Vec::new();
        let skills = load_skills_from_dir(tmp.path(), SkillSource::Workspace, &mut errors);
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].name, "good");
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn missing_description_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "nodesc", "---\nname: nodesc\n---\nbody\n");

        let mut errors = Vec::new();
        let skills = load_skills_from_dir(tmp.path(), SkillSource::Workspace, &mut errors);
        assert!(skills.is_empty());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].reason.contains("description"));
    }

    #[test]
    fn precedence_workspace_overrides_bundled() {
        let bundled_tmp = tempfile::tempdir().unwrap();
        let workspace_tmp = tempfile::tempdir().unwrap();
        write_skill(bundled_tmp.path(), "shared", "---\nname: shared\ndescription: bundled version\n---\nb\n");
        write_skill(workspace_tmp.path(), "shared", "---\nname: shared\ndescription: workspace version\n---\nw\n");

        let opts = SkillLoadOptions {
            bundled_dir: Some(bundled_tmp.path().to_path_buf()),
            managed_dir: None,
            workspace_dir: Some(workspace_tmp.path().to_path_buf()),
            extra_dirs: Vec::new(),
            include_claude_skills: false,
            include_cursor_skills: false,
        };

        let outcome = load_skills(&opts);
        assert_eq!(outcome.skills.len(), 1);
        assert_eq!(outcome.skills[0].description, "workspace version");
    }
}
