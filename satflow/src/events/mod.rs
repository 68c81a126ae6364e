//! Pipeline notifications.
//!
//! Stages report noteworthy transitions (copies, mark advances, claims,
//! bomb-outs, uploads) to an [`EventSink`]. The sink is the narrow interface
//! behind which webhook or chat notification would live; the crate ships a
//! no-op sink, a logging sink and a collecting sink for tests.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kinds of notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A stage started.
    StageStarted,
    /// A stage finished (any outcome).
    StageCompleted,
    /// An object was copied into the canonical layout.
    ObjectCopied,
    /// The high-water mark advanced.
    MarkAdvanced,
    /// A timestamp was claimed as latest available.
    TimestampClaimed,
    /// An execution was superseded.
    BombOut,
    /// A file was uploaded.
    ArtifactUploaded,
    /// An artifact was archived.
    ArtifactArchived,
}

impl NotificationKind {
    /// Returns the dotted event type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StageStarted => "stage.started",
            Self::StageCompleted => "stage.completed",
            Self::ObjectCopied => "object.copied",
            Self::MarkAdvanced => "mark.advanced",
            Self::TimestampClaimed => "mark.claimed",
            Self::BombOut => "stage.bomb_out",
            Self::ArtifactUploaded => "artifact.uploaded",
            Self::ArtifactArchived => "artifact.archived",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notification emitted by a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// What happened.
    pub kind: NotificationKind,
    /// Stage that emitted it.
    pub stage: String,
    /// Payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Notification {
    /// Creates a notification.
    #[must_use]
    pub fn new(kind: NotificationKind, stage: impl Into<String>) -> Self {
        Self {
            kind,
            stage: stage.into(),
            data: None,
        }
    }

    /// Attaches a payload.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}
