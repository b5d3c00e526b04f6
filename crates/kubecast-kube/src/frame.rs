//! Watch wire format
//!
//! A watch response is newline-delimited JSON, one `{"type", "object"}` frame
//! per line. This module turns a single line into a [`WatchNotification`] or a
//! classified [`SourceError`].

use chrono::{DateTime, Utc};
use kubecast_core::{Change, ChangeType, SourceError, WatchNotification};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct WatchFrame {
    #[serde(rename = "type")]
    frame_type: String,
    #[serde(default)]
    object: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMeta {
    #[serde(default)]
    resource_version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ObjectReference {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
}

/// `core/v1` Event, reduced to what the relay forwards
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KubeEvent {
    #[serde(default)]
    metadata: ObjectMeta,
    #[serde(default)]
    involved_object: Option<ObjectReference>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    first_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    event_time: Option<DateTime<Utc>>,
}

/// `meta/v1` Status, as carried by ERROR frames and failed responses
#[derive(Debug, Default, Deserialize)]
pub(crate) struct Status {
    #[serde(default)]
    pub(crate) code: Option<u16>,
    #[serde(default)]
    pub(crate) reason: Option<String>,
    #[serde(default)]
    pub(crate) message: Option<String>,
}

impl Status {
    pub(crate) fn describe(&self) -> String {
        match (&self.reason, &self.message) {
            (Some(reason), Some(message)) => format!("{reason}: {message}"),
            (None, Some(message)) => message.clone(),
            (Some(reason), None) => reason.clone(),
            (None, None) => "no details".to_string(),
        }
    }
}

/// Map an API status code to how the watcher must react.
#[must_use]
pub fn classify_status(code: u16, detail: impl Into<String>) -> SourceError {
    let detail = format!("{code} {}", detail.into());
    match code {
        401 | 403 | 404 => SourceError::Fatal(detail),
        410 => SourceError::Expired(detail),
        _ => SourceError::Transient(detail),
    }
}

/// Parse one watch line.
pub fn parse_frame(line: &str) -> Result<WatchNotification, SourceError> {
    let frame: WatchFrame =
        serde_json::from_str(line).map_err(|e| SourceError::Malformed(e.to_string()))?;

    if let Some(change_type) = ChangeType::from_watch_type(&frame.frame_type) {
        let event: KubeEvent = serde_json::from_value(frame.object)
            .map_err(|e| SourceError::Malformed(e.to_string()))?;
        return event_to_change(change_type, event);
    }

    match frame.frame_type.as_str() {
        "BOOKMARK" => {
            let object: KubeObject = serde_json::from_value(frame.object)
                .map_err(|e| SourceError::Malformed(e.to_string()))?;
            match object.metadata.resource_version {
                Some(rv) if !rv.is_empty() => Ok(WatchNotification::Bookmark {
                    resource_version: rv,
                }),
                _ => Err(SourceError::Malformed(
                    "bookmark without resourceVersion".to_string(),
                )),
            }
        }
        "ERROR" => {
            let status: Status = serde_json::from_value(frame.object).unwrap_or_default();
            // an ERROR frame without a code still ends the watch
            Err(classify_status(status.code.unwrap_or(500), status.describe()))
        }
        other => Err(SourceError::Malformed(format!(
            "unknown watch frame type: {other}"
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct KubeObject {
    #[serde(default)]
    metadata: ObjectMeta,
}

fn event_to_change(change_type: ChangeType, event: KubeEvent) -> Result<WatchNotification, SourceError> {
    let resource_version = match event.metadata.resource_version {
        Some(rv) if !rv.is_empty() => rv,
        _ => {
            return Err(SourceError::Malformed(
                "event without resourceVersion".to_string(),
            ))
        }
    };

    let mut change = Change::new(change_type, resource_version);
    if let Some(object) = event.involved_object {
        change.involved_object_kind = object.kind;
        change.involved_object_name = object.name;
        change.involved_object_namespace = object.namespace;
    }
    change.message = event.message;
    change.occurred_at = event.first_timestamp.or(event.event_time);

    Ok(WatchNotification::Change(change))
}
