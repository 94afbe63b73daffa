//! Broadcast supervisor.
//!
//! The stream process and the grace timer both report into one event queue
//! consumed by a single loop. The timer is cancelled before the terminal
//! notification is sent, so `started` can never follow `finished`/`error`.

use std::sync::Arc;
use std::time::Duration;

use process_utils::{ProcessError, ProcessRunner};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::BroadcastRequest;
use crate::config::AppConfig;
use crate::notification::{StatusEvent, StatusNotifier};
use crate::utils::fs::{RemoveOutcome, remove_file_best_effort};

/// Lifecycle of one broadcast run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastState {
    Idle,
    Streaming,
    Finished,
    Errored,
}

/// How a broadcast run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub job_id: String,
    pub state: BroadcastState,
    pub started_notified: bool,
    /// Exit code of the stream process, if it exited normally.
    pub exit_code: Option<i32>,
    pub error: Option<String>,
    pub source_removed: bool,
}

impl BroadcastReport {
    pub fn is_success(&self) -> bool {
        self.state == BroadcastState::Finished
    }
}

#[derive(Debug)]
enum RunEvent {
    GraceElapsed,
    Exited(Result<(), ProcessError>),
}

/// Streams a file and reports its lifecycle to the coordinator.
pub struct BroadcastSupervisor {
    config: Arc<AppConfig>,
    runner: Arc<dyn ProcessRunner>,
    notifier: Arc<dyn StatusNotifier>,
}

impl BroadcastSupervisor {
    pub fn new(
        config: Arc<AppConfig>,
        runner: Arc<dyn ProcessRunner>,
        notifier: Arc<dyn StatusNotifier>,
    ) -> Self {
        Self {
            config,
            runner,
            notifier,
        }
    }

    /// Stream `request.source` to `request.stream_url` until the process exits.
    ///
    /// The outcome depends only on the process exit status.
    pub async fn run(&self, request: &BroadcastRequest) -> BroadcastReport {
        let job_id = request.job_id.as_str();
        let mut state = BroadcastState::Idle;
        let args = self.config.broadcast.stream_args(
            &self.config.profile,
            &request.source.to_string_lossy(),
            &request.stream_url,
        );

        let (tx, mut rx) = mpsc::channel(4);

        let process = {
            let runner = self.runner.clone();
            let tool = self.config.tools.ffmpeg_path.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let result = runner.run(&tool, &args).await;
                let _ = tx.send(RunEvent::Exited(result)).await;
            })
        };
        state = transition(job_id, state, BroadcastState::Streaming);
        info!(
            job_id,
            url = %request.stream_url,
            source = %request.source.display(),
            "Broadcast started"
        );

        let timer_token = CancellationToken::new();
        let timer = spawn_grace_timer(self.config.grace_period(), timer_token.clone(), tx);

        // Every event before `Exited` arrives while streaming; the loop ends there.
        let mut started_notified = false;
        let exit = loop {
            match rx.recv().await {
                Some(RunEvent::GraceElapsed) => {
                    if !started_notified {
                        started_notified = true;
                        self.deliver(StatusEvent::started(job_id)).await;
                    }
                }
                Some(RunEvent::Exited(result)) => break Some(result),
                None => break None,
            }
        };

        timer_token.cancel();
        let _ = timer.await;
        let _ = process.await;

        let (exit_code, error) = match exit {
            Some(Ok(())) => {
                state = transition(job_id, state, BroadcastState::Finished);
                self.deliver(StatusEvent::finished(job_id)).await;
                (Some(0), None)
            }
            Some(Err(e)) => {
                state = transition(job_id, state, BroadcastState::Errored);
                error!(job_id, error = %e, "Broadcast process failed");
                self.deliver(StatusEvent::error(job_id, e.to_string())).await;
                (e.exit_code(), Some(e.to_string()))
            }
            None => {
                state = transition(job_id, state, BroadcastState::Errored);
                let message = "stream process ended without reporting an exit status".to_string();
                error!(job_id, "{}", message);
                self.deliver(StatusEvent::error(job_id, message.clone())).await;
                (None, Some(message))
            }
        };

        let source_removed = if self.config.broadcast.delete_source {
            remove_file_best_effort(&request.source).await == RemoveOutcome::Removed
        } else {
            debug!(job_id, "Keeping broadcast source");
            false
        };

        BroadcastReport {
            job_id: job_id.to_string(),
            state,
            started_notified,
            exit_code,
            error,
            source_removed,
        }
    }

    /// Send `event`, logging a failed delivery instead of returning it.
    async fn deliver(&self, event: StatusEvent) {
        if let Err(e) = self.notifier.notify(&event).await {
            warn!(id = %event.id, phase = %event.status, error = %e, "Status notification failed");
        }
    }
}

fn transition(job_id: &str, from: BroadcastState, to: BroadcastState) -> BroadcastState {
    debug!(job_id, ?from, ?to, "Broadcast state change");
    to
}

/// One-shot timer that reports [`RunEvent::GraceElapsed`] unless cancelled first.
fn spawn_grace_timer(
    grace: Duration,
    token: CancellationToken,
    tx: mpsc::Sender<RunEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(grace) => {
                let _ = tx.send(RunEvent::GraceElapsed).await;
            }
        }
    })
}
