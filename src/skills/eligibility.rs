//! Skill eligibility checking.
//!
//! Evaluates a fixed, ordered predicate chain; the first failure
//! short-circuits. Pure given an `EligibilityProbe` — no environment
//! mutation, deterministic for identical probe responses.

use crate::config::SkillsConfig;

use super::{Skill, SkillSource};

/// Environment probe consulted by the filter. Kept as a trait so tests can
/// supply a fake without touching the real process environment.
pub trait EligibilityProbe {
    fn platform(&self) -> &str;
    fn has_binary(&self, name: &str) -> bool;
    fn env_var(&self, name: &str) -> Option<String>;
}

/// Probe backed by the real process environment and `PATH`.
pub struct SystemProbe;

impl EligibilityProbe for SystemProbe {
    fn platform(&self) -> &str {
        crate::platform::current_platform()
    }

    fn has_binary(&self, name: &str) -> bool {
        crate::platform::has_binary(name)
    }

    fn env_var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibilityVerdict {
    pub eligible: bool,
    pub reason: Option<String>,
}

impl EligibilityVerdict {
    fn ok() -> Self {
        EligibilityVerdict { eligible: true, reason: None }
    }

    fn reject(reason: impl Into<String>) -> Self {
        EligibilityVerdict { eligible: false, reason: Some(reason.into()) }
    }
}

/// Evaluate the fixed-order eligibility chain for `skill`.
pub fn should_include_skill(
    skill: &Skill,
    config: &SkillsConfig,
    probe: &dyn EligibilityProbe,
) -> EligibilityVerdict {
    let meta = &skill.metadata;

    // 1. `always=true` bypasses every other check.
    if meta.always {
        return EligibilityVerdict::ok();
    }

    // 2. Config-disabled.
    if let Some(entry) = config.entries.get(skill.config_key()) {
        if entry.enabled == Some(false) {
            return EligibilityVerdict::reject("disabled by configuration");
        }
    }

    // 3. Bundled allowlist.
    if skill.source == SkillSource::Bundled
        && !config.allow_bundled.is_empty()
        && !config.allow_bundled.iter().any(|n| n == &skill.name)
    {
        return EligibilityVerdict::reject("not in bundled skill allowlist");
    }

    // 4. OS restriction.
    if !meta.requires.os.is_empty() && !meta.requires.os.iter().any(|os| os == probe.platform()) {
        return EligibilityVerdict::reject(format!(
            "unsupported platform `{}` (requires: {:?})",
            probe.platform(),
            meta.requires.os
        ));
    }

    // 5. All of `requires.bins` must resolve.
    for bin in &meta.requires.bins {
        if !probe.has_binary(bin) {
            return EligibilityVerdict::reject(format!("missing required binary `{bin}`"));
        }
    }

    // 6. At least one of `requires.any_bins` must resolve.
    if !meta.requires.any_bins.is_empty() && !meta.requires.any_bins.iter().any(|b| probe.has_binary(b)) {
        return EligibilityVerdict::reject(format!(
            "none of the alternative binaries are available: {:?}",
            meta.requires.any_bins
        ));
    }

    // 7. All of `requires.env` must be set, falling back to a per-skill config override.
    let entry = config.entries.get(skill.config_key());
    for var in &meta.requires.env {
        let satisfied = probe.env_var(var).is_some()
            || entry.map(|e| e.env.contains_key(var)).unwrap_or(false)
            || (entry.and_then(|e| e.api_key.as_ref()).is_some() && meta.primary_env.as_deref() == Some(var));
        if !satisfied {
            return EligibilityVerdict::reject(format!("missing required environment variable `{var}`"));
        }
    }

    EligibilityVerdict::ok()
}
