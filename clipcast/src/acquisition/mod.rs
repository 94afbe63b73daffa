//! Resolving media references to local files.
//!
//! A reference is either a URL, a local path, or an opaque storage
//! identifier. How it becomes bytes on disk is the fetcher's business; the
//! pipeline only sees success or a fetch error.

mod http;

pub use http::HttpFetcher;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::Result;

/// Downloads a reference to a destination chosen by the caller.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Materialize `reference` at `dest` and return the written path.
    ///
    /// A partially written `dest` may be left behind on failure.
    async fn fetch(&self, reference: &str, dest: &Path) -> Result<PathBuf>;
}
