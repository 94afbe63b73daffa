//! Process runner with live output forwarding.

use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::tokio_command;

/// Failure of a single external process invocation.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for {tool}: {source}")]
    Wait {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {}", describe_code(.code))]
    Exit { tool: String, code: Option<i32> },

    #[error("failed to capture output of {tool}: {source}")]
    Capture {
        tool: String,
        #[source]
        source: std::io::Error,
    },
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

impl ProcessError {
    /// Exit code reported by the child, if it ran and exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Exit { code, .. } => *code,
            _ => None,
        }
    }

    /// Whether the process could not be started at all.
    pub fn is_spawn(&self) -> bool {
        matches!(self, Self::Spawn { .. })
    }
}

/// Runs external tools to completion.
///
/// No retries happen at this layer: a single failed invocation is reported
/// to the caller as-is.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `tool` with `args`, streaming its output, and succeed iff it exits with 0.
    async fn run(&self, tool: &str, args: &[String]) -> Result<(), ProcessError>;

    /// Like [`ProcessRunner::run`] but returns everything the tool wrote to stdout.
    async fn run_capture(&self, tool: &str, args: &[String]) -> Result<String, ProcessError>;
}

/// Tokio-backed [`ProcessRunner`].
#[derive(Debug, Clone)]
pub struct CommandRunner {
    envs: Vec<(String, String)>,
}

impl CommandRunner {
    /// Create a runner that forces the C locale so tool output parses consistently.
    pub fn new() -> Self {
        Self {
            envs: vec![("LC_ALL".to_string(), "C".to_string())],
        }
    }

    /// Add an environment variable for every spawned child.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    fn command(&self, tool: &str, args: &[String]) -> tokio::process::Command {
        let mut cmd = tokio_command(tool);
        cmd.args(args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    async fn execute(
        &self,
        tool: &str,
        args: &[String],
        capture_stdout: bool,
    ) -> Result<String, ProcessError> {
        let start = Instant::now();
        debug!(tool, ?args, "spawning process");

        let mut child = self
            .command(tool, args)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                tool: tool.to_string(),
                source,
            })?;

        let stdout_task: Option<JoinHandle<std::io::Result<String>>> =
            child.stdout.take().map(|mut stdout| {
                let tool = tool.to_string();
                if capture_stdout {
                    tokio::spawn(async move {
                        let mut buf = String::new();
                        stdout.read_to_string(&mut buf).await?;
                        Ok(buf)
                    })
                } else {
                    tokio::spawn(async move {
                        forward_lines(&tool, stdout, OutputStream::Stdout).await;
                        Ok(String::new())
                    })
                }
            });

        let stderr_task = child.stderr.take().map(|stderr| {
            let tool = tool.to_string();
            tokio::spawn(async move { forward_lines(&tool, stderr, OutputStream::Stderr).await })
        });

        let status = child.wait().await.map_err(|source| ProcessError::Wait {
            tool: tool.to_string(),
            source,
        })?;

        if let Some(task) = stderr_task {
            let _ = task.await;
        }

        let captured = match stdout_task {
            Some(task) => match task.await {
                Ok(Ok(text)) => text,
                Ok(Err(source)) => {
                    return Err(ProcessError::Capture {
                        tool: tool.to_string(),
                        source,
                    });
                }
                Err(e) => {
                    return Err(ProcessError::Capture {
                        tool: tool.to_string(),
                        source: std::io::Error::other(e),
                    });
                }
            },
            None => String::new(),
        };

        let elapsed = start.elapsed().as_secs_f64();
        if !status.success() {
            warn!(tool, code = ?status.code(), elapsed_secs = elapsed, "process failed");
            return Err(ProcessError::Exit {
                tool: tool.to_string(),
                code: status.code(),
            });
        }

        info!(tool, elapsed_secs = elapsed, "process finished");
        Ok(captured)
    }
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessRunner for CommandRunner {
    async fn run(&self, tool: &str, args: &[String]) -> Result<(), ProcessError> {
        self.execute(tool, args, false).await.map(|_| ())
    }

    async fn run_capture(&self, tool: &str, args: &[String]) -> Result<String, ProcessError> {
        self.execute(tool, args, true).await
    }
}

#[derive(Debug, Clone, Copy)]
enum OutputStream {
    Stdout,
    Stderr,
}

async fn forward_lines<R>(tool: &str, reader: R, stream: OutputStream)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match stream {
            OutputStream::Stdout => info!(tool, "{}", line),
            // ffmpeg reports progress on stderr, so only lines mentioning an error are raised.
            OutputStream::Stderr if line.to_lowercase().contains("error") => {
                warn!(tool, "{}", line)
            }
            OutputStream::Stderr => debug!(tool, "{}", line),
        }
    }
}
