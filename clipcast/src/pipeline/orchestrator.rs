//! Composition pipeline: validate, acquire, split, normalize, overlay,
//! concatenate and persist the stream manifest.
//!
//! Stages run strictly in sequence and are never retried. Whatever the
//! outcome, the job's [`TempLedger`] is swept exactly once before
//! [`Orchestrator::compose`] returns.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use process_utils::ProcessRunner;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::job::reference_extension;
use super::overlay::{self, OverlaySource, OverlayWindow};
use super::{
    InputDocument, JobPaths, PipelineJob, SegmentSource, StageContext, SweepReport, TempLedger,
    concat, transform,
};
use crate::acquisition::Fetcher;
use crate::config::AppConfig;
use crate::utils::fs;
use crate::{Error, Result};

/// Linear stage sequence of a composition run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Validate,
    Acquire,
    Split,
    Reencode,
    OverlayStatic,
    OverlayAnimated,
    AcquireRemainingSegments,
    Concatenate,
    PersistManifest,
    Done,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::Acquire => "acquire",
            Self::Split => "split",
            Self::Reencode => "reencode",
            Self::OverlayStatic => "overlay_static",
            Self::OverlayAnimated => "overlay_animated",
            Self::AcquireRemainingSegments => "acquire_remaining_segments",
            Self::Concatenate => "concatenate",
            Self::PersistManifest => "persist_manifest",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Manifest handed to the broadcast step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub stream_url: Option<String>,
    pub video_id: String,
}

impl StreamInfo {
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::io_path("reading stream info", path, e))?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Outcome of a successful composition.
#[derive(Debug, Clone)]
pub struct CompositionReport {
    pub job_id: String,
    pub output: PathBuf,
    pub stream_info: PathBuf,
    pub stages_completed: Vec<PipelineStage>,
    pub sweep: SweepReport,
}

/// Stage bookkeeping for one run.
#[derive(Debug)]
struct Progress {
    current: PipelineStage,
    completed: Vec<PipelineStage>,
    /// Files outside the temp namespace that a failed run must not leave behind.
    pending_outputs: Vec<(PathBuf, &'static str)>,
}

impl Progress {
    fn new() -> Self {
        Self {
            current: PipelineStage::Validate,
            completed: vec![PipelineStage::Validate],
            pending_outputs: Vec::new(),
        }
    }

    fn enter(&mut self, job_id: &str, stage: PipelineStage) {
        debug!(job_id, stage = %stage, "Entering stage");
        self.current = stage;
    }

    fn complete(&mut self) {
        self.completed.push(self.current);
    }
}

/// Pick the split point: the requested one, or the midpoint.
///
/// It must fall strictly inside the video.
pub fn resolve_split(requested: Option<f64>, duration: f64) -> Result<f64> {
    let split = requested.unwrap_or(duration / 2.0);
    if !(split > 0.0 && split < duration) {
        return Err(Error::validation(format!(
            "split point {split:.3}s must lie inside the principal video (0, {duration:.3})"
        )));
    }
    Ok(split)
}

/// Drives one [`PipelineJob`] through every stage.
pub struct Orchestrator {
    config: Arc<AppConfig>,
    runner: Arc<dyn ProcessRunner>,
    fetcher: Arc<dyn Fetcher>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<AppConfig>,
        runner: Arc<dyn ProcessRunner>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            config,
            runner,
            fetcher,
        }
    }

    /// Validate `doc` and compose it. Validation performs no I/O.
    pub async fn compose(&self, doc: &InputDocument) -> Result<CompositionReport> {
        let job = PipelineJob::from_document(doc)?;
        self.compose_job(&job).await
    }

    pub async fn compose_job(&self, job: &PipelineJob) -> Result<CompositionReport> {
        let started = Instant::now();
        let paths = JobPaths::new(&self.config.work_dir, &job.id);
        let ctx = StageContext::new(self.runner.clone(), self.config.clone(), paths.clone());
        let mut ledger = TempLedger::new(&job.id);
        let mut progress = Progress::new();

        info!(job_id = %job.id, work_dir = %paths.work_dir().display(), "Starting composition");
        let result = self.run_stages(&ctx, job, &mut ledger, &mut progress).await;

        match result {
            Ok(output) => {
                let sweep = ledger.sweep().await;
                progress.current = PipelineStage::Done;
                progress.complete();
                info!(
                    job_id = %job.id,
                    output = %output.display(),
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    "Composition finished"
                );
                Ok(CompositionReport {
                    job_id: job.id.clone(),
                    output,
                    stream_info: paths.stream_info(),
                    stages_completed: progress.completed,
                    sweep,
                })
            }
            Err(e) => {
                error!(
                    job_id = %job.id,
                    stage = %progress.current,
                    error = %e,
                    "Composition failed"
                );
                for (path, stage) in progress.pending_outputs.drain(..) {
                    ledger.register(path, stage);
                }
                ledger.sweep().await;
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        ctx: &StageContext,
        job: &PipelineJob,
        ledger: &mut TempLedger,
        progress: &mut Progress,
    ) -> Result<PathBuf> {
        let id = job.id.as_str();
        let overlay_config = &self.config.overlay;

        progress.enter(id, PipelineStage::Acquire);
        fs::ensure_dir_all(ctx.paths.work_dir()).await?;
        let video = self.acquire(ctx, ledger, &job.video, "source", "mp4").await?;
        let logo = self.acquire(ctx, ledger, &job.logo, "logo", "png").await?;
        let footer = self.acquire(ctx, ledger, &job.footer, "footer", "png").await?;
        let overlay_clip = match &job.overlay {
            Some(reference) => Some(self.acquire(ctx, ledger, reference, "overlay", "mp4").await?),
            None => None,
        };
        progress.complete();

        progress.enter(id, PipelineStage::Split);
        let total = transform::duration(ctx, &video).await?;
        let split = resolve_split(job.split_at, total)?;
        let (head, tail) = transform::cut(ctx, ledger, &video, split).await?;
        progress.complete();

        progress.enter(id, PipelineStage::Reencode);
        let head = transform::reencode(ctx, ledger, &head, "part_a_norm").await?;
        let tail = transform::reencode(ctx, ledger, &tail, "part_b_norm").await?;
        progress.complete();

        progress.enter(id, PipelineStage::OverlayStatic);
        let head = overlay::compose_static_footer_and_logo(
            ctx,
            ledger,
            &head,
            &footer,
            &logo,
            "part_a_static",
        )
        .await?;
        let tail = overlay::compose_static_footer_and_logo(
            ctx,
            ledger,
            &tail,
            &footer,
            &logo,
            "part_b_static",
        )
        .await?;
        progress.complete();

        progress.enter(id, PipelineStage::OverlayAnimated);
        let window = OverlayWindow::new(
            overlay_config.entry_secs,
            overlay_config.window_secs,
            overlay_config.slide_secs,
        )?;
        let source = match (overlay_clip, &job.footer_text) {
            (Some(clip), _) => Some(OverlaySource::Clip(clip)),
            (None, Some(text)) => Some(OverlaySource::Image(
                transform::render_text_image(ctx, ledger, text, "overlay_text").await?,
            )),
            (None, None) => None,
        };
        let (head, tail) = match source {
            Some(source) => {
                let head = overlay::compose_animated_overlay(
                    ctx,
                    ledger,
                    &head,
                    &source,
                    &window,
                    "part_a_final",
                )
                .await?;
                let tail = overlay::compose_animated_overlay(
                    ctx,
                    ledger,
                    &tail,
                    &source,
                    &window,
                    "part_b_final",
                )
                .await?;
                (head, tail)
            }
            None => {
                warn!(job_id = id, "No overlay clip or footer text, skipping animated overlay");
                (head, tail)
            }
        };
        progress.complete();

        progress.enter(id, PipelineStage::AcquireRemainingSegments);
        let intro = self.prepare_segment(ctx, ledger, &job.intro, "intro").await?;
        let mid = self.prepare_segment(ctx, ledger, &job.mid, "mid").await?;
        let outro = self.prepare_segment(ctx, ledger, &job.outro, "outro").await?;
        let mut segments = vec![intro, head, mid, tail, outro];
        for (n, reference) in job.extras.iter().enumerate() {
            let label = format!("extra_{}", n + 1);
            segments.push(self.prepare_segment(ctx, ledger, reference, &label).await?);
        }
        progress.complete();

        progress.enter(id, PipelineStage::Concatenate);
        let output = ctx.paths.output(&job.output_name);
        progress.pending_outputs.push((output.clone(), "concat"));
        concat::concatenate(ctx, ledger, &segments, &output).await?;
        progress.complete();

        progress.enter(id, PipelineStage::PersistManifest);
        let info_path = ctx.paths.stream_info();
        let info_tmp = ctx.paths.stream_info_temp();
        progress.pending_outputs.push((info_tmp.clone(), "persist_manifest"));
        let info = StreamInfo {
            stream_url: job.stream_url.clone(),
            video_id: job.id.clone(),
        };
        fs::write_atomic_via(&info_path, &info_tmp, serde_json::to_vec_pretty(&info)?).await?;
        info!(job_id = id, path = %info_path.display(), "Wrote stream info");
        progress.complete();

        Ok(output)
    }

    /// Fetch `reference` into `<job>_<label>.<ext>`, registering the
    /// destination first so a partial download is swept too.
    async fn acquire(
        &self,
        ctx: &StageContext,
        ledger: &mut TempLedger,
        reference: &str,
        label: &str,
        default_ext: &str,
    ) -> Result<PathBuf> {
        let ext = reference_extension(reference).unwrap_or_else(|| default_ext.to_string());
        let dest = ctx.paths.temp(label, &ext);
        ledger.register(&dest, "acquire");
        self.fetcher.fetch(reference, &dest).await
    }

    /// A concat-ready segment: a local `.mp4` as is, anything else fetched
    /// and normalized to the encoding profile.
    async fn prepare_segment(
        &self,
        ctx: &StageContext,
        ledger: &mut TempLedger,
        reference: &str,
        label: &str,
    ) -> Result<PathBuf> {
        match SegmentSource::classify(reference).await {
            SegmentSource::Local(path) => {
                info!(label, path = %path.display(), "Using local segment as is");
                Ok(path)
            }
            SegmentSource::Remote(reference) => {
                let fetched = self
                    .acquire(ctx, ledger, &reference, &format!("{label}_src"), "mp4")
                    .await?;
                transform::reencode(ctx, ledger, &fetched, label).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{RecordingFetcher, RecordingRunner, RunnerScript};
    use tempfile::TempDir;

    fn document() -> InputDocument {
        InputDocument {
            id: Some("job1".to_string()),
            video: Some("ref1".to_string()),
            logo: Some("ref2".to_string()),
            footer: Some("ref3".to_string()),
            intro: Some("ref4".to_string()),
            mid: Some("ref5".to_string()),
            outro: Some("ref6".to_string()),
            stream_url: Some("rtmp://x".to_string()),
            ..Default::default()
        }
    }

    fn orchestrator(
        dir: &TempDir,
        runner: Arc<RecordingRunner>,
        fetcher: Arc<RecordingFetcher>,
    ) -> Orchestrator {
        let config = AppConfig {
            work_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        Orchestrator::new(Arc::new(config), runner, fetcher)
    }

    async fn remaining_files(dir: &Path) -> Vec<String> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        names.sort();
        names
    }

    #[test]
    fn test_resolve_split() {
        assert_eq!(resolve_split(None, 120.0).unwrap(), 60.0);
        assert_eq!(resolve_split(Some(30.0), 120.0).unwrap(), 30.0);
        assert!(resolve_split(Some(120.0), 120.0).is_err());
        assert!(resolve_split(None, 0.0).is_err());
    }

    #[test]
    fn test_stage_order() {
        assert!(PipelineStage::Validate < PipelineStage::Acquire);
        assert!(PipelineStage::Concatenate < PipelineStage::PersistManifest);
        assert_eq!(PipelineStage::OverlayAnimated.to_string(), "overlay_animated");
    }

    #[tokio::test]
    async fn test_missing_field_fails_before_any_fetch() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let fetcher = Arc::new(RecordingFetcher::new());
        let orchestrator = orchestrator(&dir, runner.clone(), fetcher.clone());

        let mut doc = document();
        doc.logo = None;
        let err = orchestrator.compose(&doc).await.unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(fetcher.call_count(), 0);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_successful_run_keeps_only_output_and_manifest() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let fetcher = Arc::new(RecordingFetcher::new());
        let orchestrator = orchestrator(&dir, runner.clone(), fetcher.clone());

        let mut doc = document();
        doc.footer_text = Some("Live now".to_string());
        let report = orchestrator.compose(&doc).await.unwrap();

        assert_eq!(report.output, dir.path().join("job1_final.mp4"));
        assert_eq!(report.stages_completed.last(), Some(&PipelineStage::Done));
        assert!(report.sweep.is_clean());
        assert_eq!(
            remaining_files(dir.path()).await,
            ["job1_final.mp4", "stream_info.json"]
        );

        let info = StreamInfo::load(&report.stream_info).await.unwrap();
        assert_eq!(info.stream_url.as_deref(), Some("rtmp://x"));
        assert_eq!(info.video_id, "job1");
    }

    #[tokio::test]
    async fn test_concat_order() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let fetcher = Arc::new(RecordingFetcher::new());
        let orchestrator = orchestrator(&dir, runner.clone(), fetcher.clone());

        let mut doc = document();
        doc.extras = vec!["ref7".to_string()];
        orchestrator.compose(&doc).await.unwrap();

        let fetched: Vec<String> = fetcher.requests().into_iter().map(|(r, _)| r).collect();
        assert_eq!(fetched, ["ref1", "ref2", "ref3", "ref4", "ref5", "ref6", "ref7"]);

        // Without overlay or footer text the animated stage is a pass-through.
        let manifest = runner
            .calls()
            .into_iter()
            .find(|c| c.args.iter().any(|a| a == "concat"))
            .unwrap();
        assert!(manifest.args.last().unwrap().ends_with("job1_final.mp4"));
        assert!(!runner
            .calls()
            .iter()
            .any(|c| c.args.iter().any(|a| a.ends_with("part_a_final.mp4"))));
    }

    #[tokio::test]
    async fn test_final_segment_order() {
        let dir = TempDir::new().unwrap();
        let intro = dir.path().join("cached_intro.mp4");
        tokio::fs::write(&intro, b"intro").await.unwrap();

        let runner = Arc::new(RecordingRunner::new());
        let fetcher = Arc::new(RecordingFetcher::new());
        let orchestrator = orchestrator(&dir, runner.clone(), fetcher);

        let mut doc = document();
        doc.intro = Some(intro.to_string_lossy().to_string());
        doc.footer_text = Some("Live now".to_string());
        doc.extras = vec!["ref7".to_string(), "ref8".to_string()];
        orchestrator.compose(&doc).await.unwrap();

        let abs = |name: &str| std::path::absolute(dir.path().join(name)).unwrap();
        let expected: String = [
            intro.clone(),
            abs("job1_part_a_final.mp4"),
            abs("job1_mid.mp4"),
            abs("job1_part_b_final.mp4"),
            abs("job1_outro.mp4"),
            abs("job1_extra_1.mp4"),
            abs("job1_extra_2.mp4"),
        ]
        .iter()
        .map(|p| format!("file '{}'\n", p.display()))
        .collect();

        assert_eq!(runner.manifests(), [expected]);
    }

    #[tokio::test]
    async fn test_local_mp4_segment_is_used_verbatim() {
        let dir = TempDir::new().unwrap();
        let intro = dir.path().join("cached_intro.mp4");
        tokio::fs::write(&intro, b"intro").await.unwrap();

        let runner = Arc::new(RecordingRunner::new());
        let fetcher = Arc::new(RecordingFetcher::new());
        let orchestrator = orchestrator(&dir, runner.clone(), fetcher.clone());

        let mut doc = document();
        doc.intro = Some(intro.to_string_lossy().to_string());
        orchestrator.compose(&doc).await.unwrap();

        assert!(!fetcher
            .requests()
            .iter()
            .any(|(r, _)| r.ends_with("cached_intro.mp4")));
        assert!(intro.exists());
    }

    #[tokio::test]
    async fn test_fetch_failure_sweeps_partial_files() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let fetcher = Arc::new(RecordingFetcher::new().failing_on("ref3"));
        let orchestrator = orchestrator(&dir, runner.clone(), fetcher);

        let err = orchestrator.compose(&document()).await.unwrap_err();

        assert!(matches!(err, Error::Fetch { .. }));
        assert!(runner.calls().is_empty());
        assert!(remaining_files(dir.path()).await.is_empty());
    }

    #[tokio::test]
    async fn test_concat_failure_removes_everything() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::with_script(
            RunnerScript::default().fail_when_args_contain("concat", 1),
        ));
        let fetcher = Arc::new(RecordingFetcher::new());
        let orchestrator = orchestrator(&dir, runner, fetcher);

        let err = orchestrator.compose(&document()).await.unwrap_err();

        assert_eq!(err.exit_code(), Some(1));
        assert!(remaining_files(dir.path()).await.is_empty());
    }

    #[tokio::test]
    async fn test_manifest_failure_leaves_other_jobs_alone() {
        let dir = TempDir::new().unwrap();
        let neighbour = dir.path().join("job2_stream_info.json.tmp");
        tokio::fs::write(&neighbour, b"{}").await.unwrap();
        // A directory in place of the manifest makes the final rename fail.
        tokio::fs::create_dir(dir.path().join("stream_info.json")).await.unwrap();

        let runner = Arc::new(RecordingRunner::new());
        let fetcher = Arc::new(RecordingFetcher::new());
        let orchestrator = orchestrator(&dir, runner, fetcher);

        orchestrator.compose(&document()).await.unwrap_err();

        assert_eq!(
            remaining_files(dir.path()).await,
            ["job2_stream_info.json.tmp", "stream_info.json"]
        );
    }

    #[tokio::test]
    async fn test_split_outside_video_is_rejected() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::with_script(
            RunnerScript::default().capture_output("10.0"),
        ));
        let fetcher = Arc::new(RecordingFetcher::new());
        let orchestrator = orchestrator(&dir, runner.clone(), fetcher);

        let mut doc = document();
        doc.split_at = Some(45.0);
        let err = orchestrator.compose(&doc).await.unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(runner.calls().len(), 1);
        assert!(remaining_files(dir.path()).await.is_empty());
    }
}
