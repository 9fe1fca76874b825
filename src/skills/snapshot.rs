//! Immutable, versioned skill snapshots.
//!
//! A `SkillSnapshot` never mutates after creation. Hot reload (see
//! `watcher`) publishes a fresh snapshot with `version + 1` via an atomic
//! reference swap; an in-flight turn keeps the snapshot it started with.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use super::eligibility::{should_include_skill, EligibilityProbe, SystemProbe};
use super::loader::{load_skills, LoaderError, SkillLoadOptions};
use super::prompt::{format_skills_for_prompt, PromptFormat};
use super::Skill;
use crate::config::SkillsConfig;

#[derive(Debug, Clone)]
pub struct SkillSummary {
    pub name: String,
    pub primary_env: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SkillSnapshot {
    pub prompt: String,
    pub skills: Vec<SkillSummary>,
    /// Full eligible skill records, for on-demand content lookup by the
    /// `skill` tool. Not rendered into the prompt directly.
    pub eligible: Vec<Arc<Skill>>,
    pub version: u64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub content_hash: u64,
}

impl SkillSnapshot {
    pub fn find(&self, name: &str) -> Option<Arc<Skill>> {
        self.eligible.iter().find(|s| s.name == name).cloned()
    }
}

/// Build one snapshot from a load/filter pass. Pure function; `SkillEngine`
/// wraps this with versioning and hot-reload.
pub fn build_skill_snapshot(
    opts: &SkillLoadOptions,
    config: &SkillsConfig,
    probe: &dyn EligibilityProbe,
    format: PromptFormat,
    skill_description_budget: Option<usize>,
    version: u64,
) -> (SkillSnapshot, Vec<LoaderError>) {
    let outcome = load_skills(opts);

    let eligible: Vec<&Skill> = outcome
        .skills
        .iter()
        .filter(|s| should_include_skill(s, config, probe).eligible)
        .collect();

    let prompt_eligible: Vec<&Skill> = eligible
        .iter()
        .filter(|s| !s.disable_model_invocation())
        .copied()
        .collect();

    let prompt = format_skills_for_prompt(&prompt_eligible, format, skill_description_budget);

    let skills = eligible
        .iter()
        .map(|s| SkillSummary { name: s.name.clone(), primary_env: s.metadata.primary_env.clone() })
        .collect();

    let content_hash = hash_skills(&eligible);
    let eligible_owned: Vec<Arc<Skill>> = eligible.iter().map(|s| Arc::new((*s).clone())).collect();

    let snapshot = SkillSnapshot {
        prompt,
        skills,
        eligible: eligible_owned,
        version,
        created_at: chrono::Utc::now(),
        content_hash,
    };

    (snapshot, outcome.errors)
}

fn hash_skills(skills: &[&Skill]) -> u64 {
    // FNV-1a over a stable, sorted textual projection. Skills are already
    // sorted by name by the loader; re-sort defensively.
    let mut sorted: Vec<&&Skill> = skills.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut hash: u64 = 0xcbf29ce484222325;
    for skill in sorted {
        for byte in skill.name.as_bytes().iter().chain(skill.content.as_bytes()) {
            hash ^= *byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
    }
    hash
}

/// Holds the current snapshot behind an atomic reference swap and exposes
/// rebuild/invalidate for the hot-reload watcher.
pub struct SkillEngine {
    current: RwLock<Arc<SkillSnapshot>>,
    version: AtomicU64,
    opts: SkillLoadOptions,
    config: SkillsConfig,
    format: PromptFormat,
    skill_description_budget: Option<usize>,
}

impl SkillEngine {
    pub fn new(opts: SkillLoadOptions, config: SkillsConfig, format: PromptFormat, skill_description_budget: Option<usize>) -> Self {
        let (snapshot, _errors) = build_skill_snapshot(&opts, &config, &SystemProbe, format, skill_description_budget, 0);
        SkillEngine {
            current: RwLock::new(Arc::new(snapshot)),
            version: AtomicU64::new(0),
            opts,
            config,
            format,
            skill_description_budget,
        }
    }

    /// The snapshot in effect right now. Callers should clone this `Arc`
    /// once per turn so reload races never affect an in-flight turn.
    pub fn current(&self) -> Arc<SkillSnapshot> {
        self.current.read().expect("snapshot lock poisoned").clone()
    }

    /// Reload from disk and atomically publish a new snapshot, returning
    /// any per-skill load errors encountered.
    pub fn reload(&self) -> Vec<LoaderError> {
        let next_version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let (snapshot, errors) = build_skill_snapshot(
            &self.opts,
            &self.config,
            &SystemProbe,
            self.format,
            self.skill_description_budget,
            next_version,
        );
        let mut guard = self.current.write().expect("snapshot lock poisoned");
        *guard = Arc::new(snapshot);
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    struct AlwaysProbe;
    impl EligibilityProbe for AlwaysProbe {
        fn platform(&self) -> &str {
            "linux"
        }
        fn has_binary(&self, _: &str) -> bool {
            true
        }
        fn env_var(&self, _: &str) -> Option<String> {
            None
        }
    }

    fn write_skill(dir: &std::path::Path, name: &str) {
        let skill_dir = dir.join(name);
        fs::create_dir_all(&skill_dir).unwrap();
        fs::write(skill_dir.join("SKILL.md"), format!("---\nname: {name}\ndescription: demo {name}\n---\nbody\n")).unwrap();
    }

    fn opts(dir: &std::path::Path) -> SkillLoadOptions {
        SkillLoadOptions {
            bundled_dir: None,
            managed_dir: None,
            workspace_dir: Some(dir.to_path_buf()),
            extra_dirs: Vec::new(),
            include_claude_skills: false,
            include_cursor_skills: false,
        }
    }

    #[test]
    fn snapshot_is_deterministic_for_identical_input() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "a");
        write_skill(tmp.path(), "b");

        let (snap1, _) = build_skill_snapshot(&opts(tmp.path()), &SkillsConfig::default(), &AlwaysProbe, PromptFormat::StructuredTag, None, 0);
        let (snap2, _) = build_skill_snapshot(&opts(tmp.path()), &SkillsConfig::default(), &AlwaysProbe, PromptFormat::StructuredTag, None, 0);
        assert_eq!(snap1.content_hash, snap2.content_hash);
        assert_eq!(snap1.prompt, snap2.prompt);
    }

    #[test]
    fn engine_reload_bumps_version_and_keeps_old_snapshot_valid() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "a");

        let engine = SkillEngine::new(opts(tmp.path()), SkillsConfig::default(), PromptFormat::StructuredTag, None);
        let first = engine.current();
        assert_eq!(first.version, 0);

        write_skill(tmp.path(), "b");
        engine.reload();

        let second = engine.current();
        assert_eq!(second.version, 1);
        assert_eq!(first.version, 0, "previously captured Arc is unaffected by reload");
        assert_ne!(first.content_hash, second.content_hash);
    }
}
