//! Placeholder substitution for skill content.
//!
//! `$ARGUMENTS` expands to the whole argument string; `$1`-`$9` to
//! whitespace-split positional arguments; `${ENV_VAR}` to an environment
//! lookup (empty if missing); `` !`cmd` `` to the trimmed stdout of `cmd`,
//! run with a per-command timeout and a per-skill command-count cap.

use std::time::Duration;

use crate::abort::AbortHandle;
use crate::tools::runtime::{self, ExecuteOptions};

pub const SHELL_SUBSTITUTION_TIMEOUT: Duration = Duration::from_secs(10);
pub const MAX_SHELL_SUBSTITUTIONS_PER_SKILL: usize = 8;

/// Expand `$ARGUMENTS`/`$1`..`$9`/`${ENV_VAR}` — pure, no subprocesses.
pub fn expand_arguments(content: &str, arguments: &str) -> String {
    let positional: Vec<&str> = arguments.split_whitespace().collect();
    let mut out = String::with_capacity(content.len());
    let bytes = content.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if content[i..].starts_with("$ARGUMENTS") {
            out.push_str(arguments);
            i += "$ARGUMENTS".len();
        } else if bytes[i] == b'$' && i + 1 < bytes.len() && bytes[i + 1].is_ascii_digit() && bytes[i + 1] != b'0' {
            let idx = (bytes[i + 1] - b'0') as usize;
            if let Some(value) = positional.get(idx - 1) {
                out.push_str(value);
            }
            i += 2;
        } else if content[i..].starts_with("${") {
            if let Some(end) = content[i..].find('}') {
                let var_name = &content[i + 2..i + end];
                let value = std::env::var(var_name).unwrap_or_default();
                out.push_str(&value);
                i += end + 1;
            } else {
                out.push(content[i..].chars().next().unwrap());
                i += 1;
            }
        } else {
            let ch = content[i..].chars().next().unwrap();
            out.push(ch);
            i += ch.len_utf8();
        }
    }

    out
}

/// Expand `` !`cmd` `` shell substitutions. Runs sequentially; a single
/// failed/timed-out command never fails the whole expansion — it is
/// replaced with a deterministic error marker.
pub async fn expand_shell_substitutions(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut remaining = content;
    let mut count = 0usize;

    loop {
        let Some(start) = remaining.find("!`") else {
            out.push_str(remaining);
            break;
        };
        out.push_str(&remaining[..start]);
        let after_marker = &remaining[start + 2..];

        let Some(end) = after_marker.find('`') else {
            out.push_str(&remaining[start..]);
            break;
        };

        let command = &after_marker[..end];
        remaining = &after_marker[end + 1..];

        count += 1;
        if count > MAX_SHELL_SUBSTITUTIONS_PER_SKILL {
            out.push_str("[shell substitution skipped: per-skill command limit reached]");
            continue;
        }

        out.push_str(&run_substitution(command).await);
    }

    out
}

async fn run_substitution(command: &str) -> String {
    let (_handle, signal) = AbortHandle::new();
    let result = runtime::execute(
        command,
        ExecuteOptions {
            cwd: None,
            env: Default::default(),
            timeout: SHELL_SUBSTITUTION_TIMEOUT,
            on_output: None,
            abort: signal,
        },
    )
    .await;

    if result.success {
        result.output.trim_end_matches('\n').to_string()
    } else {
        format!("[shell substitution failed: {}]", result.error.unwrap_or_default())
    }
}

/// Full resolution pipeline: argument substitution, then shell substitution.
pub async fn resolve_content(content: &str, arguments: &str) -> String {
    let with_args = expand_arguments(content, arguments);
    expand_shell_substitutions(&with_args).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_placeholder_expands_to_whole_string() {
        let out = expand_arguments("run: $ARGUMENTS", "foo bar baz");
        assert_eq!(out, "run: foo bar baz");
    }

    #[test]
    fn positional_placeholders_expand() {
        let out = expand_arguments("$1 then $2", "first second third");
        assert_eq!(out, "first then second");
    }

    #[test]
    fn missing_positional_expands_to_empty() {
        let out = expand_arguments("only $3 here", "one two");
        assert_eq!(out, "only  here");
    }

    #[test]
    fn env_placeholder_expands() {
        std::env::set_var("PLACEHOLDER_TEST_VAR", "expanded-value");
        let out = expand_arguments("value=${PLACEHOLDER_TEST_VAR}", "");
        assert_eq!(out, "value=expanded-value");
    }

    #[test]
    fn missing_env_placeholder_expands_to_empty() {
        std::env::remove_var("PLACEHOLDER_TEST_VAR_MISSING");
        let out = expand_arguments("value=${PLACEHOLDER_TEST_VAR_MISSING}", "");
        assert_eq!(out, "value=");
    }

    #[tokio::test]
    async fn shell_substitution_expands_command_output() {
        let out = expand_shell_substitutions("today is !`echo 2026`").await;
        assert_eq!(out, "today is 2026");
    }

    #[tokio::test]
    async fn shell_substitution_caps_command_count() {
        let many = "!`echo 1` ".repeat(MAX_SHELL_SUBSTITUTIONS_PER_SKILL + 2);
        let out = expand_shell_substitutions(&many).await;
        assert!(out.contains("command limit reached"));
    }

    #[tokio::test]
    async fn full_pipeline_resolves_args_then_shell() {
        let out = resolve_content("hello $1, today is !`echo 2026`", "world").await;
        assert_eq!(out, "hello world, today is 2026");
    }
}
