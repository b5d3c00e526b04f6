//! Event normalizer
//!
//! Maps a raw [`Change`] onto the [`NormalizedEvent`] wire record. Pure: no
//! I/O, and the only failure is a change that lacks the involved-object
//! metadata a subscriber needs to make sense of it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::change::Change;

/// Canonical timestamp pattern (UTC)
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Rendered in place of a missing timestamp
pub const TIME_NOT_AVAILABLE: &str = "N/A";

/// Object block of the wire record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventObject {
    /// Involved object kind
    pub kind: String,
    /// Involved object name
    pub name: String,
    /// Involved object namespace, empty when cluster-scoped
    pub namespace: String,
    /// Event message
    pub message: String,
}

/// Wire record sent to every subscriber, one per message.
///
/// Field names and order are fixed; serializing the same value always yields
/// the same text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    /// `ADDED`, `MODIFIED` or `DELETED`
    #[serde(rename = "type")]
    pub event_type: String,
    /// The involved object and message
    pub object: EventObject,
    /// `YYYY-MM-DD HH:MM:SS` or `N/A`
    pub time: String,
}

impl NormalizedEvent {
    /// Serialize to the JSON text frame sent over the wire.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Normalization failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    /// The change lacks a required field
    #[error("malformed change at resourceVersion {resource_version}: missing {field}")]
    MalformedChange {
        /// Cursor of the offending change
        resource_version: String,
        /// Name of the missing field
        field: &'static str,
    },
}

/// Normalize one change.
///
/// Kind and name are required; namespace and message default to empty.
pub fn normalize(change: &Change) -> Result<NormalizedEvent, NormalizeError> {
    let kind = required(change, change.involved_object_kind.as_deref(), "kind")?;
    let name = required(change, change.involved_object_name.as_deref(), "name")?;

    let time = change
        .occurred_at
        .map(|ts| ts.format(TIME_FORMAT).to_string())
        .unwrap_or_else(|| TIME_NOT_AVAILABLE.to_string());

    Ok(NormalizedEvent {
        event_type: change.change_type.as_str().to_string(),
        object: EventObject {
            kind: kind.to_string(),
            name: name.to_string(),
            namespace: change
                .involved_object_namespace
                .clone()
                .unwrap_or_default(),
            message: change.message.clone().unwrap_or_default(),
        },
        time,
    })
}

fn required<'a>(
    change: &Change,
    value: Option<&'a str>,
    field: &'static str,
) -> Result<&'a str, NormalizeError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(NormalizeError::MalformedChange {
            resource_version: change.resource_version.clone(),
            field,
        }),
    }
}
