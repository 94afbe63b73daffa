//! HTTP-backed fetcher.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

use super::Fetcher;
use crate::config::AcquisitionConfig;
use crate::utils::fs::is_file;
use crate::{Error, Result};

/// Where a reference points.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Url(Url),
    LocalFile(PathBuf),
}

/// Downloads URLs directly and expands storage identifiers through a URL
/// template. References naming an existing local file are copied.
pub struct HttpFetcher {
    client: Client,
    url_template: String,
}

impl HttpFetcher {
    pub fn new(config: &AcquisitionConfig) -> Result<Self> {
        let mut builder = Client::builder().timeout(Duration::from_secs(config.timeout_secs));
        if let Some(agent) = &config.user_agent {
            builder = builder.user_agent(agent.clone());
        }
        let client = builder
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url_template: config.download_url_template.clone(),
        })
    }

    /// Direct-download URL for an opaque storage identifier.
    pub fn storage_url(&self, id: &str) -> Result<Url> {
        let encoded: String = url::form_urlencoded::byte_serialize(id.as_bytes()).collect();
        let raw = self.url_template.replace("{id}", &encoded);
        Url::parse(&raw).map_err(|e| Error::fetch(id, format!("invalid download url '{raw}': {e}")))
    }

    async fn target(&self, reference: &str) -> Result<Target> {
        if let Ok(url) = Url::parse(reference) {
            match url.scheme() {
                "http" | "https" => return Ok(Target::Url(url)),
                "file" => {
                    let path = url
                        .to_file_path()
                        .map_err(|_| Error::fetch(reference, "not a local file url"))?;
                    return Ok(Target::LocalFile(path));
                }
                _ => {}
            }
        }
        let path = Path::new(reference);
        if is_file(path).await {
            return Ok(Target::LocalFile(path.to_path_buf()));
        }
        self.storage_url(reference).map(Target::Url)
    }

    async fn download(&self, reference: &str, url: Url, dest: &Path) -> Result<()> {
        debug!(reference, url = %url, "Requesting download");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::fetch(reference, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(reference, %status, "Download rejected");
            return Err(Error::fetch(
                reference,
                format!("HTTP {status}: {}", body.trim()),
            ));
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| Error::fetch(reference, format!("creating {}: {e}", dest.display())))?;
        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::fetch(reference, e))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| Error::fetch(reference, format!("writing {}: {e}", dest.display())))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| Error::fetch(reference, format!("writing {}: {e}", dest.display())))?;

        if written == 0 {
            return Err(Error::fetch(reference, "empty response body"));
        }
        debug!(reference, bytes = written, "Download complete");
        Ok(())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, reference: &str, dest: &Path) -> Result<PathBuf> {
        info!(reference, dest = %dest.display(), "Fetching asset");
        match self.target(reference).await? {
            Target::Url(url) => self.download(reference, url, dest).await?,
            Target::LocalFile(src) => {
                tokio::fs::copy(&src, dest).await.map_err(|e| {
                    Error::fetch(reference, format!("copying {}: {e}", src.display()))
                })?;
            }
        }
        Ok(dest.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(&AcquisitionConfig::default()).unwrap()
    }

    #[test]
    fn test_storage_identifier_expands_template() {
        let url = fetcher().storage_url("1AbC-d_E").unwrap();
        assert_eq!(
            url.as_str(),
            "https://drive.google.com/uc?export=download&id=1AbC-d_E"
        );
    }

    #[test]
    fn test_identifier_is_encoded() {
        let url = fetcher().storage_url("a b&c").unwrap();
        assert!(url.as_str().ends_with("id=a+b%26c"));
    }

    #[tokio::test]
    async fn test_target_classification() {
        let f = fetcher();
        assert_eq!(
            f.target("https://cdn.example/a.mp4").await.unwrap(),
            Target::Url(Url::parse("https://cdn.example/a.mp4").unwrap())
        );
        assert!(matches!(
            f.target("ref1").await.unwrap(),
            Target::Url(u) if u.host_str() == Some("drive.google.com")
        ));

        let dir = TempDir::new().unwrap();
        let local = dir.path().join("intro.mp4");
        tokio::fs::write(&local, b"mp4").await.unwrap();
        assert_eq!(
            f.target(&local.to_string_lossy()).await.unwrap(),
            Target::LocalFile(local.clone())
        );
        // A directory is not a local asset.
        assert!(matches!(
            f.target(&dir.path().to_string_lossy()).await.unwrap(),
            Target::Url(_)
        ));
    }

    #[tokio::test]
    async fn test_local_file_is_copied() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("logo.png");
        tokio::fs::write(&src, b"png").await.unwrap();
        let dest = dir.path().join("job1_logo.png");

        let written = fetcher()
            .fetch(&src.to_string_lossy(), &dest)
            .await
            .unwrap();
        assert_eq!(written, dest);
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"png");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_fetch_error() {
        let dir = TempDir::new().unwrap();
        let err = fetcher()
            .fetch("http://127.0.0.1:9/clip.mp4", &dir.path().join("out.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Fetch { .. }));
    }
}
