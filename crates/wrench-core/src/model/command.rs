use std::process::Stdio;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use super::ModelClient;

/// Captured result of a child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Last few lines of stderr, for error messages.
    pub fn stderr_tail(&self) -> String {
        let lines: Vec<&str> = self.stderr.trim_end().lines().collect();
        let start = lines.len().saturating_sub(5);
        lines[start..].join("\n")
    }
}

/// Spawn `program args...`, write `input` to its stdin, and capture its
/// output.
///
/// Stdin is written while stdout and stderr are drained so a chatty child
/// cannot block on a full pipe. The child is killed if the returned future
/// is dropped.
pub async fn run_with_input(program: &str, args: &[String], input: &str) -> Result<CommandOutput> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to spawn {program} {}", args.join(" ")))?;

    let mut stdin_pipe = child.stdin.take();
    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();

    let write_stdin = async {
        if let Some(mut pipe) = stdin_pipe.take() {
            // A child that exits without reading stdin closes the pipe early.
            let _ = pipe.write_all(input.as_bytes()).await;
            let _ = pipe.shutdown().await;
        }
    };

    let read_stdout = async {
        let mut buf = Vec::new();
        if let Some(ref mut pipe) = stdout_pipe {
            pipe.read_to_end(&mut buf).await.ok();
        }
        String::from_utf8_lossy(&buf).into_owned()
    };

    let read_stderr = async {
        let mut buf = Vec::new();
        if let Some(ref mut pipe) = stderr_pipe {
            pipe.read_to_end(&mut buf).await.ok();
        }
        String::from_utf8_lossy(&buf).into_owned()
    };

    let (_, status, stdout, stderr) =
        tokio::join!(write_stdin, child.wait(), read_stdout, read_stderr);
    let status = status.with_context(|| format!("failed to wait on {program}"))?;

    Ok(CommandOutput {
        exit_code: status.code(),
        stdout,
        stderr,
    })
}

/// A model reached through an external command.
///
/// The prompt is written to the command's stdin and the completion is its
/// stdout. A non-zero exit is an error.
#[derive(Debug, Clone)]
pub struct CommandModel {
    name: String,
    program: String,
    args: Vec<String>,
}

impl CommandModel {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        let program = program.into();
        Self {
            name: program.clone(),
            program,
            args,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl ModelClient for CommandModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let output = run_with_input(&self.program, &self.args, prompt).await?;
        if !output.success() {
            bail!(
                "model command {} exited with {}: {}",
                self.name,
                output
                    .exit_code
                    .map_or_else(|| "signal".to_owned(), |c| c.to_string()),
                output.stderr_tail()
            );
        }
        tracing::debug!(
            model = %self.name,
            prompt_bytes = prompt.len(),
            completion_bytes = output.stdout.len(),
            "model completion"
        );
        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandModel {
        CommandModel::new("sh", vec!["-c".to_owned(), script.to_owned()]).with_name("sh")
    }

    #[tokio::test]
    async fn prompt_is_piped_to_stdin() {
        let model = sh("tr a-z A-Z");
        assert_eq!(model.complete("reboot pdu").await.unwrap(), "REBOOT PDU");
    }

    #[tokio::test]
    async fn non_zero_exit_is_error() {
        let model = sh("echo 'quota exceeded' >&2; exit 3");
        let err = model.complete("x").await.unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("exited with 3"), "{msg}");
        assert!(msg.contains("quota exceeded"), "{msg}");
    }

    #[tokio::test]
    async fn child_ignoring_stdin_still_completes() {
        let model = sh("echo done");
        let big = "x".repeat(1 << 20);
        assert_eq!(model.complete(&big).await.unwrap().trim(), "done");
    }

    #[tokio::test]
    async fn missing_program_is_error() {
        let model = CommandModel::new("/nonexistent/wrench-model", vec![]);
        assert!(model.complete("x").await.is_err());
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let output = CommandOutput {
            exit_code: Some(1),
            stdout: String::new(),
            stderr: (1..=8).map(|n| format!("line {n}\n")).collect(),
        };
        assert_eq!(output.stderr_tail(), "line 4\nline 5\nline 6\nline 7\nline 8");
    }
}
