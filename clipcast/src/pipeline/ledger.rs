//! Job-scoped record of every local file a pipeline run creates.
//!
//! The ledger is the only source of truth for cleanup: files are registered
//! the moment a stage decides to produce them and are removed in a single
//! sweep when the job terminates. Nothing is ever inferred from the
//! filesystem.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::utils::fs::{RemoveOutcome, remove_file_best_effort};

/// A file produced during a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempAsset {
    pub path: PathBuf,
    /// Stage that created the file.
    pub stage: &'static str,
}

/// Summary of a cleanup sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Number of deletion attempts made.
    pub attempted: usize,
    pub removed: usize,
    /// Registered but never written (or already gone).
    pub missing: usize,
    pub failed: Vec<PathBuf>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Append-only list of temp files for one job.
#[derive(Debug, Default)]
pub struct TempLedger {
    job_id: String,
    assets: Vec<TempAsset>,
}

impl TempLedger {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            assets: Vec::new(),
        }
    }

    /// Record `path` as created by `stage`.
    ///
    /// Registering the same path again is a no-op; returns whether the path
    /// was newly added.
    pub fn register(&mut self, path: impl Into<PathBuf>, stage: &'static str) -> bool {
        let path = path.into();
        if self.contains(&path) {
            debug!(job_id = %self.job_id, path = %path.display(), "Path already registered");
            return false;
        }
        debug!(job_id = %self.job_id, stage, path = %path.display(), "Registered temp file");
        self.assets.push(TempAsset { path, stage });
        true
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.assets.iter().any(|a| a.path == path)
    }

    pub fn assets(&self) -> &[TempAsset] {
        &self.assets
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Delete every registered file, independently of one another.
    ///
    /// Consumes the ledger so a job can only sweep once. A failure on one
    /// path is logged and does not stop the rest.
    pub async fn sweep(self) -> SweepReport {
        let mut report = SweepReport::default();
        for asset in &self.assets {
            report.attempted += 1;
            match remove_file_best_effort(&asset.path).await {
                RemoveOutcome::Removed => report.removed += 1,
                RemoveOutcome::Missing => report.missing += 1,
                RemoveOutcome::Failed => {
                    warn!(
                        job_id = %self.job_id,
                        stage = asset.stage,
                        path = %asset.path.display(),
                        "Could not clean up temp file"
                    );
                    report.failed.push(asset.path.clone());
                }
            }
        }
        info!(
            job_id = %self.job_id,
            removed = report.removed,
            missing = report.missing,
            failed = report.failed.len(),
            "Temp file sweep finished"
        );
        report
    }
}
