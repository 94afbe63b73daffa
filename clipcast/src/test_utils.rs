//! In-memory fakes for the process runner, fetcher and notifier.
//!
//! Used by unit tests and the integration tests under `tests/`.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use process_utils::{ProcessError, ProcessRunner};

use crate::acquisition::Fetcher;
use crate::notification::{StatusEvent, StatusNotifier};
use crate::{Error, Result};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One recorded process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub tool: String,
    pub args: Vec<String>,
}

/// Scripted behaviour for [`RecordingRunner`].
#[derive(Debug, Clone, Default)]
pub struct RunnerScript {
    failures: Vec<(String, i32)>,
    spawn_failure: bool,
    capture: Option<String>,
    delay: Option<Duration>,
}

impl RunnerScript {
    /// Exit with `code` whenever one argument equals `arg`.
    pub fn fail_when_args_contain(mut self, arg: impl Into<String>, code: i32) -> Self {
        self.failures.push((arg.into(), code));
        self
    }

    /// Fail every invocation as if the tool were missing.
    pub fn fail_to_spawn(mut self) -> Self {
        self.spawn_failure = true;
        self
    }

    /// Stdout returned by `run_capture`.
    pub fn capture_output(mut self, text: impl Into<String>) -> Self {
        self.capture = Some(text.into());
        self
    }

    /// Sleep this long before each invocation resolves.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Records every invocation and, on success, creates the file named by the
/// last argument the way the real engine would.
///
/// Concat manifests are read at call time, before any cleanup removes them.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    script: RunnerScript,
    calls: Mutex<Vec<RecordedCall>>,
    manifests: Mutex<Vec<String>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(script: RunnerScript) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    /// Contents of every concat manifest handed to the engine, in call order.
    pub fn manifests(&self) -> Vec<String> {
        lock(&self.manifests).clone()
    }

    async fn invoke(&self, tool: &str, args: &[String]) -> std::result::Result<(), ProcessError> {
        lock(&self.calls).push(RecordedCall {
            tool: tool.to_string(),
            args: args.to_vec(),
        });
        if let Some(manifest) = concat_manifest(args) {
            let text = tokio::fs::read_to_string(manifest).await.unwrap_or_default();
            lock(&self.manifests).push(text);
        }
        if self.script.spawn_failure {
            return Err(ProcessError::Spawn {
                tool: tool.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            });
        }
        if let Some(delay) = self.script.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some((_, code)) = self
            .script
            .failures
            .iter()
            .find(|(needle, _)| args.iter().any(|a| a == needle))
        {
            return Err(ProcessError::Exit {
                tool: tool.to_string(),
                code: Some(*code),
            });
        }
        Ok(())
    }
}

/// The `-i` input of a `-f concat` invocation.
fn concat_manifest(args: &[String]) -> Option<&str> {
    if !args.windows(2).any(|w| w[0] == "-f" && w[1] == "concat") {
        return None;
    }
    let pos = args.iter().position(|a| a == "-i")?;
    args.get(pos + 1).map(String::as_str)
}

#[async_trait]
impl ProcessRunner for RecordingRunner {
    async fn run(&self, tool: &str, args: &[String]) -> std::result::Result<(), ProcessError> {
        self.invoke(tool, args).await?;
        if let Some(output) = args.last().filter(|a| !a.starts_with('-') && !a.contains("://")) {
            let _ = tokio::fs::write(output, b"media").await;
        }
        Ok(())
    }

    async fn run_capture(
        &self,
        tool: &str,
        args: &[String],
    ) -> std::result::Result<String, ProcessError> {
        self.invoke(tool, args).await?;
        Ok(self.script.capture.clone().unwrap_or_else(|| "120.0\n".to_string()))
    }
}

/// Writes fixed bytes for every reference and records what was asked for.
#[derive(Debug, Default)]
pub struct RecordingFetcher {
    failing: Vec<String>,
    requests: Mutex<Vec<(String, PathBuf)>>,
}

impl RecordingFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail fetches of `reference`, leaving a partial file at the destination.
    pub fn failing_on(mut self, reference: impl Into<String>) -> Self {
        self.failing.push(reference.into());
        self
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn requests(&self) -> Vec<(String, PathBuf)> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl Fetcher for RecordingFetcher {
    async fn fetch(&self, reference: &str, dest: &Path) -> Result<PathBuf> {
        lock(&self.requests).push((reference.to_string(), dest.to_path_buf()));
        if self.failing.iter().any(|r| r == reference) {
            let _ = tokio::fs::write(dest, b"partial").await;
            return Err(Error::fetch(reference, "not found"));
        }
        tokio::fs::write(dest, reference.as_bytes())
            .await
            .map_err(|e| Error::fetch(reference, e))?;
        Ok(dest.to_path_buf())
    }
}

/// Collects events; optionally fails every delivery after recording it.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    fail: bool,
    events: Mutex<Vec<StatusEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<StatusEvent> {
        lock(&self.events).clone()
    }
}

#[async_trait]
impl StatusNotifier for RecordingNotifier {
    async fn notify(&self, event: &StatusEvent) -> Result<()> {
        lock(&self.events).push(event.clone());
        if self.fail {
            return Err(Error::Notify("coordinator unreachable".to_string()));
        }
        Ok(())
    }
}
