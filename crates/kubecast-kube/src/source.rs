//! Kubernetes implementation of [`EventSource`]
//!
//! Lists `core/v1` events once to learn the current resourceVersion, then
//! streams `?watch=1` responses line by line.

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use kubecast_core::{EventSource, SourceError, WatchStream};
use reqwest::Response;
use serde::Deserialize;
use std::time::Duration;
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;
use tracing::debug;

use crate::client::KubeClient;
use crate::frame::{classify_status, parse_frame, Status};
use crate::lines::{Line, WatchLines};

/// Default server-side watch timeout
pub const DEFAULT_WATCH_TIMEOUT: Duration = Duration::from_secs(300);

/// Longest accepted watch line
const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Which events to watch
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Restrict to one namespace; `None` watches the whole cluster
    pub namespace: Option<String>,
    /// Server-side field selector, e.g. `type=Warning`
    pub field_selector: Option<String>,
    /// Server-side watch timeout; the server ends the stream after it
    pub timeout: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            namespace: None,
            field_selector: None,
            timeout: DEFAULT_WATCH_TIMEOUT,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListMeta {
    #[serde(default)]
    resource_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventList {
    metadata: ListMeta,
}

/// Cluster event collection over the Kubernetes API
#[derive(Debug, Clone)]
pub struct KubeEventSource {
    client: KubeClient,
    options: WatchOptions,
}

impl KubeEventSource {
    /// Create a source
    #[must_use]
    pub fn new(client: KubeClient, options: WatchOptions) -> Self {
        Self { client, options }
    }

    /// Events collection path
    #[must_use]
    pub fn collection_path(&self) -> String {
        match self.options.namespace.as_deref().filter(|ns| !ns.is_empty()) {
            Some(ns) => format!("/api/v1/namespaces/{ns}/events"),
            None => "/api/v1/events".to_string(),
        }
    }

    fn selector_query(&self) -> Vec<(&'static str, String)> {
        self.options
            .field_selector
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| ("fieldSelector", s.clone()))
            .collect()
    }
}

#[async_trait]
impl EventSource for KubeEventSource {
    async fn current_version(&self) -> Result<String, SourceError> {
        let mut query = self.selector_query();
        query.push(("limit", "1".to_string()));

        let response = self
            .client
            .get(&self.collection_path())
            .query(&query)
            .timeout(self.client.request_timeout())
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;

        let list: EventList = response
            .json()
            .await
            .map_err(|e| SourceError::Transient(format!("invalid event list: {e}")))?;

        match list.metadata.resource_version {
            Some(rv) if !rv.is_empty() => Ok(rv),
            _ => Err(SourceError::Transient(
                "event list has no resourceVersion".to_string(),
            )),
        }
    }

    async fn watch(&self, resource_version: &str) -> Result<WatchStream, SourceError> {
        let mut query = self.selector_query();
        query.extend([
            ("watch", "1".to_string()),
            ("resourceVersion", resource_version.to_string()),
            ("allowWatchBookmarks", "true".to_string()),
            ("timeoutSeconds", self.options.timeout.as_secs().to_string()),
        ]);

        let response = self
            .client
            .get(&self.collection_path())
            .query(&query)
            // server ends the stream at `timeoutSeconds`; this only catches a hung connection
            .timeout(self.options.timeout + self.client.request_timeout())
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        debug!(path = %self.collection_path(), resource_version, "Watch stream open");

        let body = response.bytes_stream().map_err(std::io::Error::other);
        let lines = FramedRead::new(StreamReader::new(body), WatchLines::new(MAX_FRAME_BYTES));

        let notifications = lines.filter_map(|line| async move {
            match line {
                Ok(Line::Frame(line)) if line.trim().is_empty() => None,
                Ok(Line::Frame(line)) => Some(parse_frame(&line)),
                Ok(Line::Oversized) => Some(Err(SourceError::Malformed(format!(
                    "watch frame exceeds {MAX_FRAME_BYTES} bytes"
                )))),
                Err(e) => Some(Err(SourceError::Transient(format!(
                    "watch stream interrupted: {e}"
                )))),
            }
        });

        Ok(notifications.boxed())
    }
}

fn transport_error(e: reqwest::Error) -> SourceError {
    SourceError::Transient(format!("request failed: {e}"))
}

async fn check_status(response: Response) -> Result<Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<Status>(&body)
        .map(|s| s.describe())
        .unwrap_or_else(|_| status.canonical_reason().unwrap_or("unknown").to_string());
    Err(classify_status(status.as_u16(), detail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::DEFAULT_REQUEST_TIMEOUT;
    use crate::credentials::{ClusterCredentials, CredentialOrigin};

    fn source(namespace: Option<&str>) -> KubeEventSource {
        let creds = ClusterCredentials {
            server: "http://127.0.0.1:1".to_string(),
            token: None,
            ca_pem: None,
            identity_pem: None,
            insecure_skip_tls_verify: false,
            default_namespace: None,
            origin: CredentialOrigin::InCluster,
        };
        let client = KubeClient::new(&creds, DEFAULT_REQUEST_TIMEOUT).unwrap();
        KubeEventSource::new(
            client,
            WatchOptions {
                namespace: namespace.map(str::to_string),
                ..WatchOptions::default()
            },
        )
    }

    #[test]
    fn test_collection_path() {
        assert_eq!(source(None).collection_path(), "/api/v1/events");
        assert_eq!(source(Some("")).collection_path(), "/api/v1/events");
        assert_eq!(
            source(Some("kube-system")).collection_path(),
            "/api/v1/namespaces/kube-system/events"
        );
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transient() {
        let err = source(None).current_version().await.unwrap_err();
        assert!(matches!(err, SourceError::Transient(_)));
    }
}
