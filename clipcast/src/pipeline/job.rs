//! Input document, validated job model and per-job file naming.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::fs;
use crate::{Error, Result};

/// Name of the manifest consumed by the broadcast step.
pub const STREAM_INFO_FILE: &str = "stream_info.json";

/// Raw job description as read from disk.
///
/// Every field is optional here so that validation can report all missing
/// fields at once instead of failing on the first serde error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputDocument {
    #[serde(default)]
    pub id: Option<String>,
    /// Principal video reference.
    #[serde(default, alias = "principal_video")]
    pub video: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub footer: Option<String>,
    #[serde(default)]
    pub intro: Option<String>,
    #[serde(default, alias = "mid_roll")]
    pub mid: Option<String>,
    #[serde(default)]
    pub outro: Option<String>,
    #[serde(default)]
    pub stream_url: Option<String>,
    #[serde(default)]
    pub footer_text: Option<String>,
    /// Animated overlay clip reference.
    #[serde(default)]
    pub overlay: Option<String>,
    /// Split point of the principal video in seconds.
    #[serde(default)]
    pub split_at: Option<f64>,
    /// Extra segments appended after the outro, in order.
    #[serde(default)]
    pub extras: Vec<String>,
    /// Output file name inside the work directory.
    #[serde(default)]
    pub output: Option<String>,
}

impl InputDocument {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::io_path("reading input document", path, e))?;
        Self::from_json(&text)
    }
}

/// A validated end-to-end run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineJob {
    pub id: String,
    pub video: String,
    pub logo: String,
    pub footer: String,
    pub intro: String,
    pub mid: String,
    pub outro: String,
    pub stream_url: Option<String>,
    pub footer_text: Option<String>,
    pub overlay: Option<String>,
    pub split_at: Option<f64>,
    pub extras: Vec<String>,
    pub output_name: String,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

impl PipelineJob {
    /// Validate a document. Performs no I/O.
    pub fn from_document(doc: &InputDocument) -> Result<Self> {
        let fields = [
            ("id", &doc.id),
            ("video", &doc.video),
            ("logo", &doc.logo),
            ("footer", &doc.footer),
            ("intro", &doc.intro),
            ("mid", &doc.mid),
            ("outro", &doc.outro),
        ];
        let missing: Vec<&str> = fields
            .iter()
            .filter(|(_, value)| non_empty(value).is_none())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(Error::validation(format!(
                "missing required field(s): {}",
                missing.join(", ")
            )));
        }

        let id = non_empty(&doc.id).unwrap_or_default();
        if !is_safe_file_name(&id) {
            return Err(Error::validation(format!(
                "job id '{id}' must only contain ASCII letters, digits, '-', '_' or '.'"
            )));
        }

        if let Some(split) = doc.split_at
            && !(split.is_finite() && split > 0.0)
        {
            return Err(Error::validation(format!(
                "split_at must be a positive number of seconds, got {split}"
            )));
        }

        let output_name = match non_empty(&doc.output) {
            Some(name) if is_safe_file_name(&name) => name,
            Some(name) => {
                return Err(Error::validation(format!(
                    "output '{name}' must be a plain file name"
                )));
            }
            None => format!("{id}_final.mp4"),
        };

        let extras = doc
            .extras
            .iter()
            .map(|e| e.trim())
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            video: non_empty(&doc.video).unwrap_or_default(),
            logo: non_empty(&doc.logo).unwrap_or_default(),
            footer: non_empty(&doc.footer).unwrap_or_default(),
            intro: non_empty(&doc.intro).unwrap_or_default(),
            mid: non_empty(&doc.mid).unwrap_or_default(),
            outro: non_empty(&doc.outro).unwrap_or_default(),
            stream_url: non_empty(&doc.stream_url),
            footer_text: non_empty(&doc.footer_text),
            overlay: non_empty(&doc.overlay),
            split_at: doc.split_at,
            extras,
            output_name,
            id,
        })
    }
}

/// File naming for one job. Every temp file is prefixed with the job id so
/// concurrent jobs sharing a work directory never collide.
#[derive(Debug, Clone)]
pub struct JobPaths {
    work_dir: PathBuf,
    job_id: String,
}

impl JobPaths {
    pub fn new(work_dir: impl Into<PathBuf>, job_id: impl Into<String>) -> Self {
        Self {
            work_dir: work_dir.into(),
            job_id: job_id.into(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// `<work_dir>/<job_id>_<label>.<ext>`
    pub fn temp(&self, label: &str, ext: &str) -> PathBuf {
        self.work_dir.join(format!("{}_{}.{}", self.job_id, label, ext))
    }

    pub fn output(&self, name: &str) -> PathBuf {
        self.work_dir.join(name)
    }

    pub fn stream_info(&self) -> PathBuf {
        self.work_dir.join(STREAM_INFO_FILE)
    }

    /// Staging file for [`Self::stream_info`], inside the job's namespace.
    pub fn stream_info_temp(&self) -> PathBuf {
        self.work_dir.join(format!("{}_{}.tmp", self.job_id, STREAM_INFO_FILE))
    }
}

/// Where a concatenation segment comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentSource {
    /// Existing local `.mp4`, used verbatim without download or re-encode.
    Local(PathBuf),
    /// Needs acquisition and normalization.
    Remote(String),
}

impl SegmentSource {
    /// Classify a segment reference.
    ///
    /// The local-file shortcut wins whenever the reference ends in `.mp4` and
    /// names an existing file, even if it could also be a remote identifier.
    pub async fn classify(reference: &str) -> Self {
        let path = Path::new(reference);
        let is_mp4 = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("mp4"));
        if is_mp4 && fs::is_file(path).await {
            Self::Local(path.to_path_buf())
        } else {
            Self::Remote(reference.to_string())
        }
    }
}

/// File extension implied by a reference, if any.
///
/// URLs use the last path segment. Opaque storage identifiers have none.
pub fn reference_extension(reference: &str) -> Option<String> {
    let last = match url::Url::parse(reference) {
        Ok(url) if url.has_host() => url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(str::to_string)?,
        _ => Path::new(reference)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())?,
    };
    let ext = Path::new(&last).extension()?.to_str()?.to_ascii_lowercase();
    (!ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .then_some(ext)
}
