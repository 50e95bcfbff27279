//! Artifact record types.
//!
//! An artifact is an interactive UI snippet the assistant emitted inside a
//! fenced code block. Records are rebuilt from message content on every
//! parse, so identity comes from `(message_id, ordinal)` and never from time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether the enclosing fence has closed yet.
///
/// Ordered so that `Streaming < Ready`: the status only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    /// The closing fence has not arrived yet
    Streaming,
    /// The closing fence was seen
    Ready,
}

impl std::fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactStatus::Streaming => write!(f, "streaming"),
            ArtifactStatus::Ready => write!(f, "ready"),
        }
    }
}

/// A detected, addressable interactive snippet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// `"{message_id}-{ordinal}"`, or `"temp-{ordinal}"` without a message
    pub id: String,
    /// Human-readable label derived from the source
    pub title: String,
    /// Full extracted source, possibly still growing
    pub code: String,
    /// Fence language tag (lowercased)
    pub language: String,
    pub status: ArtifactStatus,
    /// Last mutation time; ordering and debugging only
    pub timestamp: DateTime<Utc>,
    /// Owning message, lookup only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl Artifact {
    /// Build the stable id for the `ordinal`-th accepted block of a message.
    pub fn make_id(message_id: Option<&str>, ordinal: usize) -> String {
        format!("{}-{}", message_id.unwrap_or("temp"), ordinal)
    }

    pub fn is_streaming(&self) -> bool {
        self.status == ArtifactStatus::Streaming
    }

    /// True when `other` differs in any field the registry compares on upsert.
    pub fn differs_from(&self, other: &Artifact) -> bool {
        self.code != other.code || self.status != other.status || self.title != other.title
    }
}
