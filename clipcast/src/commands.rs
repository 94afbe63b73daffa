//! Command implementations shared by the binary and the integration tests.

use std::path::Path;
use std::sync::Arc;

use process_utils::{CommandRunner, ProcessRunner};
use tracing::{info, warn};

use crate::acquisition::{Fetcher, HttpFetcher};
use crate::broadcast::{
    BroadcastReport, BroadcastRequest, BroadcastSupervisor, PreparedSource, ensure_source_exists,
    prepare_source, require_stream_url,
};
use crate::config::AppConfig;
use crate::notification::{StatusNotifier, notifier_from_config};
use crate::pipeline::{
    CompositionReport, InputDocument, JobPaths, Orchestrator, PipelineJob, StreamInfo,
};
use crate::Result;

/// Wired-up collaborators for one invocation.
pub struct App {
    config: Arc<AppConfig>,
    runner: Arc<dyn ProcessRunner>,
    fetcher: Arc<dyn Fetcher>,
    notifier: Arc<dyn StatusNotifier>,
}

impl App {
    pub fn new(
        config: AppConfig,
        runner: Arc<dyn ProcessRunner>,
        fetcher: Arc<dyn Fetcher>,
        notifier: Arc<dyn StatusNotifier>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            runner,
            fetcher,
            notifier,
        }
    }

    /// Production wiring: real processes, HTTP downloads and notifications.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(&config.acquisition)?);
        let notifier = notifier_from_config(&config.notifier)?;
        Ok(Self::new(
            config,
            Arc::new(CommandRunner::new()),
            fetcher,
            notifier,
        ))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn validate(&self, document: &Path) -> Result<PipelineJob> {
        let doc = InputDocument::load(document).await?;
        PipelineJob::from_document(&doc)
    }

    pub async fn compose(&self, document: &Path) -> Result<CompositionReport> {
        let doc = InputDocument::load(document).await?;
        Orchestrator::new(self.config.clone(), self.runner.clone(), self.fetcher.clone())
            .compose(&doc)
            .await
    }

    /// Stream `source`, or the job's composed output when none is given.
    ///
    /// The destination is resolved before anything is downloaded, and a
    /// downloaded source is removed again if the stream never starts.
    pub async fn broadcast(
        &self,
        document: &Path,
        source: Option<&str>,
    ) -> Result<BroadcastReport> {
        let job = self.validate(document).await?;
        let paths = JobPaths::new(&self.config.work_dir, &job.id);

        let stream_url = match (&job.stream_url, source) {
            (Some(url), _) => Some(url.clone()),
            (None, None) => self.stream_url_from_manifest(&paths, &job.id).await,
            (None, Some(_)) => None,
        };
        let stream_url = require_stream_url(&job.id, stream_url.as_deref())?;

        let prepared = match source {
            Some(reference) => prepare_source(self.fetcher.as_ref(), &paths, reference).await?,
            None => PreparedSource::in_place(paths.output(&job.output_name)),
        };
        if let Err(e) = ensure_source_exists(&prepared.path).await {
            prepared.discard().await;
            return Err(e);
        }
        let request = BroadcastRequest {
            job_id: job.id.clone(),
            source: prepared.path,
            stream_url,
        };
        Ok(self.supervisor().run(&request).await)
    }

    /// Compose, then stream the composed output.
    pub async fn run(&self, document: &Path) -> Result<(CompositionReport, BroadcastReport)> {
        let doc = InputDocument::load(document).await?;
        let job = PipelineJob::from_document(&doc)?;
        let stream_url = require_stream_url(&job.id, job.stream_url.as_deref())?;

        let composition =
            Orchestrator::new(self.config.clone(), self.runner.clone(), self.fetcher.clone())
                .compose_job(&job)
                .await?;
        let request = BroadcastRequest {
            job_id: job.id.clone(),
            source: composition.output.clone(),
            stream_url,
        };
        let report = self.supervisor().run(&request).await;
        Ok((composition, report))
    }

    fn supervisor(&self) -> BroadcastSupervisor {
        BroadcastSupervisor::new(
            self.config.clone(),
            self.runner.clone(),
            self.notifier.clone(),
        )
    }

    async fn stream_url_from_manifest(&self, paths: &JobPaths, job_id: &str) -> Option<String> {
        match StreamInfo::load(&paths.stream_info()).await {
            Ok(info) if info.video_id == job_id => {
                info!(job_id, "Using stream url from stream info");
                info.stream_url
            }
            Ok(info) => {
                warn!(job_id, video_id = %info.video_id, "Stream info belongs to another job");
                None
            }
            Err(e) => {
                warn!(job_id, error = %e, "No usable stream info");
                None
            }
        }
    }
}
