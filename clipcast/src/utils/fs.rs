//! Filesystem helpers shared across modules.
//!
//! These helpers provide consistent error context (operation + path) and
//! a single best-effort removal routine used by every cleanup path.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{Error, Result};

/// Result of a best-effort file removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    /// Nothing was there to remove.
    Missing,
    Failed,
}

/// Ensure a directory exists, creating it (recursively) if needed.
pub async fn ensure_dir_all(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| Error::io_path("creating directory", path, e))
}

/// Ensure the parent directory of a file path exists.
pub async fn ensure_parent_dir(path: &Path) -> Result<()> {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    ensure_dir_all(parent).await
}

/// Sibling temp file used by [`write_atomic`] for `path`.
pub fn atomic_temp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Write `contents` to `path` through a sibling temp file and a rename.
pub async fn write_atomic(path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
    write_atomic_via(path, &atomic_temp_path(path), contents).await
}

/// Like [`write_atomic`], staging through `tmp`, which must be on the same
/// filesystem as `path`.
pub async fn write_atomic_via(
    path: &Path,
    tmp: &Path,
    contents: impl AsRef<[u8]>,
) -> Result<()> {
    ensure_parent_dir(path).await?;

    tokio::fs::write(tmp, contents)
        .await
        .map_err(|e| Error::io_path("writing", tmp, e))?;
    if let Err(e) = tokio::fs::rename(tmp, path).await {
        let _ = tokio::fs::remove_file(tmp).await;
        return Err(Error::io_path("renaming", tmp, e));
    }
    Ok(())
}

/// Remove a file, logging instead of failing.
pub async fn remove_file_best_effort(path: &Path) -> RemoveOutcome {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Removed file");
            RemoveOutcome::Removed
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "File already absent");
            RemoveOutcome::Missing
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove file");
            RemoveOutcome::Failed
        }
    }
}

/// Whether `path` exists and is a regular file.
pub async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}
