//! Raw upstream change records.
//!
//! A [`Change`] is what the upstream watcher hands to the pipeline for every
//! add/modify/delete notification. It mirrors the event source closely and
//! keeps optional fields optional: deciding whether a record is usable is the
//! normalizer's job, not the watcher's.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of change reported by the watch subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    /// Object was created
    Added,
    /// Object was updated
    Modified,
    /// Object was removed
    Deleted,
}

impl ChangeType {
    /// Wire name of the change type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "ADDED",
            Self::Modified => "MODIFIED",
            Self::Deleted => "DELETED",
        }
    }

    /// Parse a watch frame type (`ADDED`, `MODIFIED`, `DELETED`).
    ///
    /// Returns `None` for non-change frames such as `BOOKMARK` or `ERROR`.
    #[must_use]
    pub fn from_watch_type(value: &str) -> Option<Self> {
        match value {
            "ADDED" => Some(Self::Added),
            "MODIFIED" => Some(Self::Modified),
            "DELETED" => Some(Self::Deleted),
            _ => None,
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single upstream notification about a cluster event object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    /// What happened to the event object
    pub change_type: ChangeType,
    /// Cursor for resuming the watch after this change
    pub resource_version: String,
    /// Kind of the object the event is about (e.g. `Pod`)
    pub involved_object_kind: Option<String>,
    /// Name of the object the event is about
    pub involved_object_name: Option<String>,
    /// Namespace of the object the event is about (empty for cluster-scoped objects)
    pub involved_object_namespace: Option<String>,
    /// Free-text event message
    pub message: Option<String>,
    /// When the event first occurred, if the source recorded it
    pub occurred_at: Option<DateTime<Utc>>,
}

impl Change {
    /// Create a change with no involved-object metadata.
    #[must_use]
    pub fn new(change_type: ChangeType, resource_version: impl Into<String>) -> Self {
        Self {
            change_type,
            resource_version: resource_version.into(),
            involved_object_kind: None,
            involved_object_name: None,
            involved_object_namespace: None,
            message: None,
            occurred_at: None,
        }
    }

    /// Set the involved object
    #[must_use]
    pub fn with_object(
        mut self,
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        self.involved_object_kind = Some(kind.into());
        self.involved_object_name = Some(name.into());
        self.involved_object_namespace = Some(namespace.into());
        self
    }

    /// Set the event message
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Set the occurrence timestamp
    #[must_use]
    pub fn with_occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }
}
