//! Upstream event source abstraction
//!
//! The watcher only needs two things from the cluster: the version of the
//! event collection "now", and a watch stream starting after a given version.
//! `kubecast-kube` implements this against the Kubernetes API; tests script it.

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::change::Change;

/// Stream of notifications from one watch subscription.
///
/// Ends when the upstream closes the subscription.
pub type WatchStream = BoxStream<'static, Result<WatchNotification, SourceError>>;

/// One item of a watch subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchNotification {
    /// An event object was added, modified or deleted
    Change(Change),
    /// Progress marker: the collection reached this version without changes to report
    Bookmark {
        /// Version to resume from
        resource_version: String,
    },
}

/// Upstream failure, classified by how the watcher must react.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// Network blip, server error, stream cut: reopen after a backoff
    #[error("transient upstream failure: {0}")]
    Transient(String),

    /// The resume cursor was compacted away: drop it and restart from now
    #[error("resource version expired: {0}")]
    Expired(String),

    /// Credentials rejected or resource unavailable: stop watching
    #[error("fatal upstream failure: {0}")]
    Fatal(String),

    /// A single notification could not be decoded: skip it
    #[error("malformed notification: {0}")]
    Malformed(String),
}

impl SourceError {
    /// Whether the watcher must give up
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// A watchable collection of cluster events.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Resolve the current version of the event collection.
    ///
    /// Watching from this version yields only changes that happen afterwards.
    async fn current_version(&self) -> Result<String, SourceError>;

    /// Open a watch that yields changes after `resource_version`.
    async fn watch(&self, resource_version: &str) -> Result<WatchStream, SourceError>;
}
