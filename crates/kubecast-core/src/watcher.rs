//! Upstream watcher
//!
//! Owns the single watch subscription to the cluster event source and turns
//! it into an endless sequence of [`Change`] records. Broken subscriptions are
//! reopened from the last delivered resourceVersion, with exponential backoff
//! between failed attempts. Fatal failures stop the watcher and are returned
//! to the caller.

use futures::StreamExt;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backoff::{Backoff, BackoffConfig};
use crate::change::Change;
use crate::hub::Hub;
use crate::normalize::normalize;
use crate::source::{EventSource, SourceError, WatchNotification};

/// Watcher failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchError {
    /// The upstream rejected the watch permanently
    #[error("upstream watch failed permanently: {0}")]
    Fatal(SourceError),
}

/// The process-wide upstream subscription
pub struct UpstreamWatcher {
    source: Arc<dyn EventSource>,
    backoff: Backoff,
    cursor: Option<String>,
}

impl UpstreamWatcher {
    /// Create a watcher over `source`
    #[must_use]
    pub fn new(source: Arc<dyn EventSource>, backoff: BackoffConfig) -> Self {
        Self {
            source,
            backoff: Backoff::new(backoff),
            cursor: None,
        }
    }

    /// Last delivered resourceVersion
    #[must_use]
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    /// Watch until cancelled, calling `on_change` for every change in order.
    ///
    /// `on_change` runs inline: the next notification is not read until it
    /// returns. Returns `Ok(())` on cancellation and `Err` on a fatal failure.
    pub async fn run<F>(mut self, cancel: CancellationToken, mut on_change: F) -> Result<(), WatchError>
    where
        F: FnMut(Change) + Send,
    {
        info!("Upstream watcher started");

        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(resource_version = ?self.cursor, "Upstream watcher stopped");
                    return Ok(());
                }
                outcome = self.watch_once(&mut on_change) => outcome,
            };

            match outcome {
                Ok(received) => {
                    debug!(received, "Watch closed by upstream, reopening");
                    continue;
                }
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "Upstream watch failed permanently");
                    return Err(WatchError::Fatal(e));
                }
                Err(SourceError::Expired(reason)) => {
                    warn!(
                        resource_version = ?self.cursor,
                        reason = %reason,
                        "Watch cursor expired, resuming from current state"
                    );
                    self.cursor = None;
                }
                Err(e) => {
                    warn!(error = %e, "Upstream watch interrupted");
                }
            }

            let delay = self.backoff.next_delay();
            debug!(
                attempt = self.backoff.attempt(),
                delay_ms = delay.as_millis() as u64,
                "Reopening watch after backoff"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(resource_version = ?self.cursor, "Upstream watcher stopped");
                    return Ok(());
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Run on its own task, relaying every change into `hub`.
    pub fn spawn(self, hub: Arc<Hub>, cancel: CancellationToken) -> JoinHandle<Result<(), WatchError>> {
        tokio::spawn(async move { self.run(cancel, move |change| relay(&hub, &change)).await })
    }

    /// One subscription: open, consume until it ends. Returns the number of
    /// notifications received.
    async fn watch_once<F>(&mut self, on_change: &mut F) -> Result<usize, SourceError>
    where
        F: FnMut(Change) + Send,
    {
        let from = match &self.cursor {
            Some(cursor) => cursor.clone(),
            None => {
                let current = self.source.current_version().await?;
                info!(resource_version = %current, "Watching from current state");
                self.cursor = Some(current.clone());
                current
            }
        };

        let mut stream = self.source.watch(&from).await?;
        debug!(resource_version = %from, "Watch opened");

        let mut received = 0;
        while let Some(notification) = stream.next().await {
            match notification {
                Ok(WatchNotification::Change(change)) => {
                    received += 1;
                    if self.cursor.as_deref() == Some(change.resource_version.as_str()) {
                        debug!(
                            resource_version = %change.resource_version,
                            "Skipping repeated change"
                        );
                        continue;
                    }
                    let resource_version = change.resource_version.clone();
                    on_change(change);
                    self.cursor = Some(resource_version);
                    self.backoff.reset();
                }
                Ok(WatchNotification::Bookmark { resource_version }) => {
                    received += 1;
                    debug!(resource_version = %resource_version, "Watch bookmark");
                    self.cursor = Some(resource_version);
                }
                Err(SourceError::Malformed(reason)) => {
                    warn!(reason = %reason, "Skipping undecodable notification");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(received)
    }
}

/// Normalize a change and publish it; malformed changes are logged and skipped.
pub fn relay(hub: &Hub, change: &Change) {
    match normalize(change) {
        Ok(event) => {
            debug!(
                event_type = %event.event_type,
                kind = %event.object.kind,
                name = %event.object.name,
                namespace = %event.object.namespace,
                "Publishing cluster event"
            );
            let report = hub.publish(event);
            if report.dropped > 0 || report.evicted > 0 {
                debug!(
                    delivered = report.delivered,
                    dropped = report.dropped,
                    evicted = report.evicted,
                    "Publish hit full subscriber queues"
                );
            }
        }
        Err(e) => warn!(error = %e, "Skipping malformed change"),
    }
}

#[cfg(test)]
mod tests;
