//! Application-wide error types.

use std::path::{Path, PathBuf};

use process_utils::ProcessError;
use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Failed to fetch '{reference}': {message}")]
    Fetch { reference: String, message: String },

    #[error("Failed to probe duration of {}: {message}", path.display())]
    Probe { path: PathBuf, message: String },

    /// External engine failure. A concat of incompatible segments also lands here.
    #[error("Transform stage '{stage}' failed: {source}")]
    Transform {
        stage: &'static str,
        #[source]
        source: ProcessError,
    },

    #[error("Status notification failed: {0}")]
    Notify(String),

    #[error("Broadcast failed: {0}")]
    Broadcast(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error while {op} {}: {source}", path.display())]
    IoPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn fetch(reference: impl Into<String>, message: impl ToString) -> Self {
        Self::Fetch {
            reference: reference.into(),
            message: message.to_string(),
        }
    }

    pub fn probe(path: &Path, message: impl Into<String>) -> Self {
        Self::Probe {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    pub fn transform(stage: &'static str, source: ProcessError) -> Self {
        Self::Transform { stage, source }
    }

    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Exit code of the failed external process, when the failure came from one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Transform { source, .. } => source.exit_code(),
            _ => None,
        }
    }
}
