//! External command execution.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::debug;

use crate::command::CommandSpec;

/// Lines of stderr kept in failure details.
const TAIL_LINES: usize = 20;

/// The command ran past its `timeout_secs`; the child is killed.
#[derive(Debug, thiserror::Error)]
#[error("command {name} timed out after {secs} seconds")]
pub struct CommandTimeout {
    pub name: String,
    pub secs: u64,
}

/// Captured result of one command run.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code, -1 when terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last few lines of stderr, trimmed.
    pub fn stderr_tail(&self) -> String {
        let lines: Vec<&str> = self.stderr.trim_end().lines().collect();
        let start = lines.len().saturating_sub(TAIL_LINES);
        lines[start..].join("\n")
    }

    /// Last non-empty line of stdout.
    pub fn last_stdout_line(&self) -> Option<&str> {
        self.stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
    }
}

pub struct CommandRunner;

impl CommandRunner {
    /// Run `spec` with placeholders replaced by `vars` and `envs` added to
    /// the child environment.
    pub async fn run(
        spec: &CommandSpec,
        vars: &[(&str, &str)],
        envs: &[(&str, &str)],
    ) -> anyhow::Result<CommandOutput> {
        let start = Instant::now();

        let argv = spec.substituted(vars);
        let Some((exe, args)) = argv.split_first() else {
            anyhow::bail!("command {} is empty", spec.name);
        };

        debug!(name = %spec.name, exe = %exe, "spawning command");

        let child = Command::new(exe)
            .args(args)
            .envs(envs.iter().copied())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| anyhow::anyhow!("failed to spawn {}: {e}", exe))?;

        let output = if spec.timeout_secs > 0 {
            tokio::time::timeout(
                Duration::from_secs(spec.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| CommandTimeout {
                name: spec.name.clone(),
                secs: spec.timeout_secs,
            })??
        } else {
            child.wait_with_output().await?
        };

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(stdout: &str, stderr: &str, exit_code: i32) -> CommandOutput {
        CommandOutput {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            duration_ms: 1,
        }
    }

    #[test]
    fn last_stdout_line_skips_blank_lines() {
        let out = output("building...\nimage:abc123\n\n  \n", "", 0);
        assert_eq!(out.last_stdout_line(), Some("image:abc123"));
        assert!(output("\n\n", "", 0).last_stdout_line().is_none());
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let stderr: String = (0..50).map(|i| format!("line {i}\n")).collect();
        let tail = output("", &stderr, 1).stderr_tail();
        assert_eq!(tail.lines().count(), TAIL_LINES);
        assert!(tail.starts_with("line 30"));
        assert!(tail.ends_with("line 49"));
    }

    #[test]
    fn success_is_exit_zero() {
        assert!(output("", "", 0).success());
        assert!(!output("", "", 1).success());
        assert!(!output("", "", -1).success());
    }

    #[tokio::test]
    async fn empty_command_is_an_error() {
        let spec = CommandSpec::new("nothing", vec![], 5);
        let err = CommandRunner::run(&spec, &[], &[]).await.unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[tokio::test]
    async fn timeout_is_detectable() {
        let spec = CommandSpec::new("slow", vec!["sleep".into(), "5".into()], 1);
        let err = CommandRunner::run(&spec, &[], &[]).await.unwrap_err();
        assert!(err.is::<CommandTimeout>());
    }
}
