//! Subprocess execution: streaming output, timeout/abort with a graceful
//! grace period before force-kill, and output truncation.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::abort::AbortSignal;

/// Output is capped at this many characters; beyond it a marker replaces
/// the remainder.
pub const MAX_OUTPUT_CHARS: usize = 100_000;

const GRACE_PERIOD: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: String,
    pub exit_code: i32,
    pub duration_ms: u128,
    pub error: Option<String>,
}

/// Callback invoked once per streamed output chunk (a line, or a 4 KiB
/// boundary for lines that never terminate).
pub type OutputSink<'a> = Box<dyn FnMut(&str) + Send + 'a>;

pub struct ExecuteOptions<'a> {
    pub cwd: Option<&'a Path>,
    pub env: std::collections::HashMap<String, String>,
    pub timeout: Duration,
    pub on_output: Option<OutputSink<'a>>,
    pub abort: AbortSignal,
}

/// Run `command` through the platform shell.
pub async fn execute(command: &str, opts: ExecuteOptions<'_>) -> ExecutionResult {
    #[cfg(unix)]
    let (shell, shell_arg) = ("/bin/sh", "-c");
    #[cfg(windows)]
    let (shell, shell_arg) = ("cmd", "/C");

    run(shell, &[shell_arg, command], opts).await
}

/// Run a multi-line script body by writing it to a temp file first. The
/// file is removed once the subprocess exits, regardless of outcome.
pub async fn execute_script(script: &str, opts: ExecuteOptions<'_>) -> ExecutionResult {
    let path = std::env::temp_dir().join(format!("agent-core-script-{}", uuid::Uuid::new_v4()));

    if let Err(e) = std::fs::write(&path, script) {
        return ExecutionResult {
            success: false,
            output: String::new(),
            exit_code: -1,
            duration_ms: 0,
            error: Some(format!("failed to write temp script: {e}")),
        };
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(meta) = std::fs::metadata(&path) {
            let mut perms = meta.permissions();
            perms.set_mode(0o700);
            let _ = std::fs::set_permissions(&path, perms);
        }
    }

    #[cfg(unix)]
    let result = run(&path.display().to_string(), &[], opts).await;
    #[cfg(windows)]
    let result = run("cmd", &["/C", &path.display().to_string()], opts).await;

    let _ = std::fs::remove_file(&path);
    result
}

async fn run(program: &str, args: &[&str], mut opts: ExecuteOptions<'_>) -> ExecutionResult {
    let start = Instant::now();

    let mut command = Command::new(program);
    command.args(args);
    if let Some(cwd) = opts.cwd {
        command.current_dir(cwd);
    }
    for (k, v) in opts.env.drain() {
        command.env(k, v);
    }
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let mut child = match command.spawn() {
        Ok(c) => c,
        Err(e) => {
            return ExecutionResult {
                success: false,
                output: String::new(),
                exit_code: -1,
                duration_ms: start.elapsed().as_millis(),
                error: Some(format!("failed to spawn `{program}`: {e}")),
            };
        }
    };

    let stdout = child.stdout.take().expect("piped stdout");
    let stderr = child.stderr.take().expect("piped stderr");

    let mut captured = String::new();
    let mut truncated = false;

    let mut stdout_lines = BufReader::new(stdout).lines();
    let mut stderr_lines = BufReader::new(stderr).lines();

    let mut on_output = opts.on_output.take();
    let wait = async {
        loop {
            tokio::select! {
                line = stdout_lines.next_line() => {
                    match line {
                        Ok(Some(line)) => append(&mut captured, &line, &mut truncated, &mut on_output),
                        Ok(None) => break,
                        Err(_) => break,
                    }
                }
                line = stderr_lines.next_line() => {
                    match line {
                        Ok(Some(line)) => append(&mut captured, &line, &mut truncated, &mut on_output),
                        Ok(None) => {}
                        Err(_) => {}
                    }
                }
            }
        }
        child.wait().await
    };

    let outcome = tokio::select! {
        status = wait => TimeoutOutcome::Finished(status),
        _ = tokio::time::sleep(opts.timeout) => TimeoutOutcome::TimedOut,
        _ = opts.abort.cancelled() => TimeoutOutcome::Aborted,
    };

    match outcome {
        TimeoutOutcome::Finished(Ok(status)) => ExecutionResult {
            success: status.success(),
            output: captured,
            exit_code: status.code().unwrap_or(-1),
            duration_ms: start.elapsed().as_millis(),
            error: if status.success() {
                None
            } else {
                Some(format!("exited with status {status}"))
            },
        },
        TimeoutOutcome::Finished(Err(e)) => ExecutionResult {
            success: false,
            output: captured,
            exit_code: -1,
            duration_ms: start.elapsed().as_millis(),
            error: Some(format!("wait failed: {e}")),
        },
        TimeoutOutcome::TimedOut => {
            terminate_gracefully(&mut child).await;
            ExecutionResult {
                success: false,
                output: captured,
                exit_code: -1,
                duration_ms: start.elapsed().as_millis(),
                error: Some("timed out".to_string()),
            }
        }
        TimeoutOutcome::Aborted => {
            terminate_gracefully(&mut child).await;
            ExecutionResult {
                success: false,
                output: captured,
                exit_code: -1,
                duration_ms: start.elapsed().as_millis(),
                error: Some("aborted".to_string()),
            }
        }
    }
}

enum TimeoutOutcome {
    Finished(std::io::Result<std::process::ExitStatus>),
    TimedOut,
    Aborted,
}

fn append(
    captured: &mut String,
    line: &str,
    truncated: &mut bool,
    on_output: &mut Option<OutputSink<'_>>,
) {
    if let Some(sink) = on_output {
        sink(line);
    }
    if *truncated {
        return;
    }
    if captured.len() + line.len() + 1 > MAX_OUTPUT_CHARS {
        let remaining = MAX_OUTPUT_CHARS.saturating_sub(captured.len());
        captured.push_str(&line[..remaining.min(line.len())]);
        captured.push_str("\n...[output truncated]");
        *truncated = true;
        return;
    }
    captured.push_str(line);
    captured.push('\n');
}

/// SIGTERM-then-wait-then-kill (unix) / direct kill (windows, no graceful stop API).
async fn terminate_gracefully(child: &mut tokio::process::Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            let _ = Command::new("kill").args(["-TERM", &pid.to_string()]).status().await;
        }
        if tokio::time::timeout(GRACE_PERIOD, child.wait()).await.is_ok() {
            return;
        }
    }
    let _ = child.kill().await;
    let _ = child.wait().await;
}
