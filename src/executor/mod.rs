//! Uniform invocation of external tools.
//!
//! Every compiler, runner, instrumentation and mutation call goes through
//! [`run_command`], which captures exit code, stdout and stderr and enforces a
//! hard timeout. A timed-out child is killed when its future is dropped.

mod java;

pub use java::{JavaToolchain, PitRequest, JUNIT_RUNNER};

use crate::error::EngineError;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// Captured result of one external process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process could not be spawned, was killed by a signal,
    /// or timed out.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }

    /// Exit code rendered for log lines.
    pub fn exit_label(&self) -> String {
        match (self.timed_out, self.exit_code) {
            (true, _) => "timeout".to_string(),
            (false, Some(code)) => code.to_string(),
            (false, None) => "none".to_string(),
        }
    }

    /// Classify a failed run of `tool`. Timeouts map to `ExecutionTimeout`,
    /// any other non-zero exit to `ToolFailed` with a stderr preview.
    pub fn check(&self, tool: &str, timeout: Duration) -> Result<(), EngineError> {
        if self.timed_out {
            return Err(EngineError::ExecutionTimeout {
                tool: tool.to_string(),
                seconds: timeout.as_secs(),
            });
        }
        if !self.success() {
            return Err(EngineError::ToolFailed {
                tool: tool.to_string(),
                exit: self.exit_label(),
                stderr: truncate_output(self.stderr.trim(), 500),
            });
        }
        Ok(())
    }
}

/// A single external command invocation.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
}

impl ToolCommand {
    pub fn new(program: impl Into<OsString>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Command line rendered for debug logging.
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|s| s.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Run a command to completion or until its timeout elapses.
pub async fn run_command(command: &ToolCommand) -> CommandOutput {
    let start = Instant::now();
    tracing::debug!("exec: {}", command.display());

    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(ref dir) = command.cwd {
        cmd.current_dir(dir);
    }

    let child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            return CommandOutput {
                exit_code: None,
                stdout: String::new(),
                stderr: format!("Failed to spawn {}: {}", command.program.to_string_lossy(), e),
                duration_ms: start.elapsed().as_millis() as u64,
                timed_out: false,
            };
        }
    };

    let result = tokio::time::timeout(command.timeout, child.wait_with_output()).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(Ok(output)) => CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration_ms,
            timed_out: false,
        },
        Ok(Err(e)) => CommandOutput {
            exit_code: None,
            stdout: String::new(),
            stderr: format!("Command execution error: {}", e),
            duration_ms,
            timed_out: false,
        },
        Err(_) => {
            tracing::debug!("Command timed out after {:?}", command.timeout);
            CommandOutput {
                exit_code: None,
                stdout: String::new(),
                stderr: format!(
                    "Command timed out after {} seconds",
                    command.timeout.as_secs()
                ),
                duration_ms,
                timed_out: true,
            }
        }
    }
}

/// Ordered classpath. Entry order is preserved exactly as pushed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classpath {
    entries: Vec<PathBuf>,
}

impl Classpath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: impl Into<PathBuf>) -> &mut Self {
        self.entries.push(entry.into());
        self
    }

    pub fn with(mut self, entry: impl Into<PathBuf>) -> Self {
        self.entries.push(entry.into());
        self
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn position(&self, entry: &Path) -> Option<usize> {
        self.entries.iter().position(|e| e == entry)
    }

    /// Joined with the platform path separator.
    pub fn to_arg(&self) -> OsString {
        std::env::join_paths(&self.entries)
            .unwrap_or_else(|_| {
                let sep = if cfg!(windows) { ";" } else { ":" };
                self.entries
                    .iter()
                    .map(|p| p.to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join(sep)
                    .into()
            })
    }
}

/// Compiles Java sources into an output directory.
#[async_trait]
pub trait Compiler: Send + Sync {
    async fn compile(
        &self,
        sources: &[PathBuf],
        classpath: &Classpath,
        out_dir: &Path,
    ) -> CommandOutput;
}

/// Runs one test class under the JUnit runner.
#[async_trait]
pub trait TestRunner: Send + Sync {
    async fn run_test(&self, classpath: &Classpath, test_class: &str) -> CommandOutput;
}

/// Cut output to `max_bytes`, respecting char boundaries.
pub fn truncate_output(output: &str, max_bytes: usize) -> String {
    if output.len() <= max_bytes {
        return output.to_string();
    }
    let mut end = max_bytes;
    while !output.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...(truncated)", &output[..end])
}

/// First `lines` lines, for warn-level log previews.
pub fn preview(output: &str, lines: usize) -> String {
    output.lines().take(lines).collect::<Vec<_>>().join("\n")
}
