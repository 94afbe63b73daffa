//! Status events reported to the coordinator.

use serde::{Deserialize, Serialize};

/// Lifecycle phase of a broadcast run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusPhase {
    Started,
    Finished,
    Error,
}

impl StatusPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Finished => "finished",
            Self::Error => "error",
        }
    }

    /// Whether no further event may follow this one.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Started)
    }
}

impl std::fmt::Display for StatusPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire format: `{"id": .., "status": .., "message": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub id: String,
    pub status: StatusPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusEvent {
    pub fn started(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: StatusPhase::Started,
            message: None,
        }
    }

    pub fn finished(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: StatusPhase::Finished,
            message: None,
        }
    }

    pub fn error(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: StatusPhase::Error,
            message: Some(message.into()),
        }
    }
}
