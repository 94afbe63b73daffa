//! Live broadcast of a finished asset.

mod supervisor;

pub use supervisor::{BroadcastReport, BroadcastState, BroadcastSupervisor};

use std::path::{Path, PathBuf};

use tracing::info;

use crate::acquisition::Fetcher;
use crate::pipeline::job::reference_extension;
use crate::pipeline::{JobPaths, SegmentSource};
use crate::utils::fs::{ensure_parent_dir, is_file, remove_file_best_effort};
use crate::{Error, Result};

/// What to stream, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastRequest {
    pub job_id: String,
    pub source: PathBuf,
    pub stream_url: String,
}

impl BroadcastRequest {
    pub fn new(
        job_id: impl Into<String>,
        source: impl Into<PathBuf>,
        stream_url: Option<&str>,
    ) -> Result<Self> {
        let job_id = job_id.into();
        let stream_url = require_stream_url(&job_id, stream_url)?;
        Ok(Self {
            job_id,
            source: source.into(),
            stream_url,
        })
    }
}

/// The trimmed destination URL, or a validation error when there is none.
pub fn require_stream_url(job_id: &str, stream_url: Option<&str>) -> Result<String> {
    stream_url
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::validation(format!("job '{job_id}' has no stream_url")))
}

/// A broadcast source resolved to a local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedSource {
    pub path: PathBuf,
    /// Downloaded for this broadcast rather than supplied in place.
    pub fetched: bool,
}

impl PreparedSource {
    pub fn in_place(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fetched: false,
        }
    }

    /// Remove a downloaded source. Files supplied in place are never touched.
    pub async fn discard(&self) {
        if self.fetched {
            remove_file_best_effort(&self.path).await;
        }
    }
}

/// Resolve an independently supplied broadcast source to a local file.
///
/// An existing local `.mp4` is streamed in place; anything else is fetched
/// into `<job>_broadcast_src.<ext>`. A failed fetch leaves nothing behind.
pub async fn prepare_source(
    fetcher: &dyn Fetcher,
    paths: &JobPaths,
    reference: &str,
) -> Result<PreparedSource> {
    match SegmentSource::classify(reference).await {
        SegmentSource::Local(path) => Ok(PreparedSource::in_place(path)),
        SegmentSource::Remote(reference) => {
            let ext = reference_extension(&reference).unwrap_or_else(|| "mp4".to_string());
            let dest = paths.temp("broadcast_src", &ext);
            info!(reference = %reference, dest = %dest.display(), "Downloading broadcast source");
            ensure_parent_dir(&dest).await?;
            match fetcher.fetch(&reference, &dest).await {
                Ok(path) => Ok(PreparedSource {
                    path,
                    fetched: true,
                }),
                Err(e) => {
                    remove_file_best_effort(&dest).await;
                    Err(e)
                }
            }
        }
    }
}

/// Whether `path` can be streamed at all.
pub async fn ensure_source_exists(path: &Path) -> Result<()> {
    if is_file(path).await {
        Ok(())
    } else {
        Err(Error::Broadcast(format!(
            "source {} does not exist",
            path.display()
        )))
    }
}
