//! Media composition pipeline.
//!
//! Stages are plain async functions over a shared [`StageContext`]; each one
//! registers the files it produces in the job's [`TempLedger`] and returns
//! the output path. The [`Orchestrator`] sequences them.

pub mod concat;
pub mod filter;
pub mod job;
pub mod ledger;
pub mod orchestrator;
pub mod overlay;
pub mod transform;

pub use job::{InputDocument, JobPaths, PipelineJob, STREAM_INFO_FILE, SegmentSource};
pub use ledger::{SweepReport, TempAsset, TempLedger};
pub use orchestrator::{CompositionReport, Orchestrator, PipelineStage, StreamInfo};

use std::path::Path;
use std::sync::Arc;

use process_utils::ProcessRunner;

use crate::Result;
use crate::config::AppConfig;

/// Everything a stage needs besides its direct inputs.
#[derive(Clone)]
pub struct StageContext {
    pub runner: Arc<dyn ProcessRunner>,
    pub config: Arc<AppConfig>,
    pub paths: JobPaths,
}

impl StageContext {
    pub fn new(runner: Arc<dyn ProcessRunner>, config: Arc<AppConfig>, paths: JobPaths) -> Self {
        Self {
            runner,
            config,
            paths,
        }
    }

    pub fn ffmpeg(&self) -> &str {
        &self.config.tools.ffmpeg_path
    }

    pub fn ffprobe(&self) -> &str {
        &self.config.tools.ffprobe_path
    }

    /// Run ffmpeg, mapping a failure to a transform error for `stage`.
    pub(crate) async fn ffmpeg_run(&self, stage: &'static str, args: &[String]) -> Result<()> {
        self.runner
            .run(self.ffmpeg(), args)
            .await
            .map_err(|e| crate::Error::transform(stage, e))
    }
}

/// Lossy path-to-argument conversion for engine argument vectors.
pub(crate) fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
