//! KubeEventSource against a local stand-in for the API server

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::StreamExt;
use kubecast_core::{ChangeType, EventSource, SourceError, WatchNotification};
use kubecast_kube::{
    ClusterCredentials, CredentialOrigin, KubeClient, KubeEventSource, WatchOptions,
    DEFAULT_REQUEST_TIMEOUT,
};
use secrecy::SecretString;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Seen = Arc<Mutex<Vec<HashMap<String, String>>>>;

const WATCH_BODY: &str = concat!(
    r#"{"type":"ADDED","object":{"metadata":{"resourceVersion":"101"},"involvedObject":{"kind":"Pod","name":"web-7","namespace":"shop"},"message":"Started container","firstTimestamp":"2024-01-02T03:04:05Z"}}"#,
    "\n\n",
    r#"{"type":"BOOKMARK","object":{"metadata":{"resourceVersion":"150"}}}"#,
    "\n",
    r#"{"type":"DELETED","object":{"metadata":{"resourceVersion":"151"},"involvedObject":{"kind":"Pod","name":"web-7","namespace":"shop"}}}"#,
    "\n",
);

/// An ADDED frame whose message pushes the line past 1 MiB, then a normal one
fn oversized_body() -> String {
    format!(
        concat!(
            r#"{{"type":"ADDED","object":{{"metadata":{{"resourceVersion":"200"}},"involvedObject":{{"kind":"Pod","name":"noisy","namespace":"shop"}},"message":"{}"}}}}"#,
            "\n",
            r#"{{"type":"ADDED","object":{{"metadata":{{"resourceVersion":"201"}},"involvedObject":{{"kind":"Pod","name":"web-8","namespace":"shop"}}}}}}"#,
            "\n",
        ),
        "x".repeat(1024 * 1024 + 10)
    )
}

async fn events(
    State(seen): State<Seen>,
    Path(namespace): Path<String>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    seen.lock().unwrap().push(query.clone());

    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer test-token") {
        return (StatusCode::UNAUTHORIZED, r#"{"kind":"Status","code":401,"reason":"Unauthorized"}"#)
            .into_response();
    }
    if namespace == "locked" {
        return (
            StatusCode::FORBIDDEN,
            r#"{"kind":"Status","code":403,"reason":"Forbidden","message":"events is forbidden"}"#,
        )
            .into_response();
    }

    if query.get("watch").map(String::as_str) != Some("1") {
        return r#"{"kind":"EventList","apiVersion":"v1","metadata":{"resourceVersion":"100"},"items":[]}"#
            .into_response();
    }
    if query.get("resourceVersion").map(String::as_str) == Some("1") {
        return (
            StatusCode::GONE,
            r#"{"kind":"Status","code":410,"reason":"Expired","message":"too old resource version: 1 (100)"}"#,
        )
            .into_response();
    }
    if namespace == "noisy" {
        return oversized_body().into_response();
    }
    WATCH_BODY.into_response()
}

async fn serve() -> (String, Seen) {
    let seen: Seen = Arc::default();
    let app = Router::new()
        .route("/api/v1/namespaces/:namespace/events", get(events))
        .with_state(seen.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    (format!("http://{addr}"), seen)
}

fn source(server: &str, namespace: &str, token: &str) -> KubeEventSource {
    let creds = ClusterCredentials {
        server: server.to_string(),
        token: Some(SecretString::from(token.to_string())),
        ca_pem: None,
        identity_pem: None,
        insecure_skip_tls_verify: false,
        default_namespace: None,
        origin: CredentialOrigin::InCluster,
    };
    KubeEventSource::new(
        KubeClient::new(&creds, DEFAULT_REQUEST_TIMEOUT).unwrap(),
        WatchOptions {
            namespace: Some(namespace.to_string()),
            field_selector: Some("type=Warning".to_string()),
            timeout: Duration::from_secs(60),
        },
    )
}

#[tokio::test]
async fn test_current_version_lists_one_event() {
    let (server, seen) = serve().await;
    let version = source(&server, "shop", "test-token")
        .current_version()
        .await
        .unwrap();

    assert_eq!(version, "100");
    let query = seen.lock().unwrap()[0].clone();
    assert_eq!(query.get("limit").map(String::as_str), Some("1"));
    assert_eq!(query.get("fieldSelector").map(String::as_str), Some("type=Warning"));
    assert!(!query.contains_key("watch"));
}

#[tokio::test]
async fn test_watch_streams_changes_and_bookmarks() {
    let (server, seen) = serve().await;
    let stream = source(&server, "shop", "test-token").watch("100").await.unwrap();
    let items: Vec<_> = stream.collect().await;

    assert_eq!(items.len(), 3);
    let Ok(WatchNotification::Change(added)) = &items[0] else {
        panic!("expected a change, got {:?}", items[0]);
    };
    assert_eq!(added.change_type, ChangeType::Added);
    assert_eq!(added.resource_version, "101");
    assert_eq!(added.involved_object_name.as_deref(), Some("web-7"));
    assert_eq!(
        items[1],
        Ok(WatchNotification::Bookmark {
            resource_version: "150".to_string()
        })
    );
    assert!(matches!(&items[2], Ok(WatchNotification::Change(c)) if c.change_type == ChangeType::Deleted));

    let query = seen.lock().unwrap()[0].clone();
    assert_eq!(query.get("resourceVersion").map(String::as_str), Some("100"));
    assert_eq!(query.get("allowWatchBookmarks").map(String::as_str), Some("true"));
    assert_eq!(query.get("timeoutSeconds").map(String::as_str), Some("60"));
}

#[tokio::test]
async fn test_status_codes_are_classified() {
    let (server, _seen) = serve().await;

    let expired = source(&server, "shop", "test-token").watch("1").await.err().unwrap();
    assert!(matches!(expired, SourceError::Expired(m) if m.contains("too old")));

    let forbidden = source(&server, "locked", "test-token").watch("100").await.err().unwrap();
    assert!(matches!(forbidden, SourceError::Fatal(m) if m.contains("forbidden")));

    let unauthorized = source(&server, "shop", "wrong").current_version().await.unwrap_err();
    assert!(unauthorized.is_fatal());
}

#[tokio::test]
async fn test_oversized_frame_is_skipped_and_stream_continues() {
    let (server, _seen) = serve().await;
    let stream = source(&server, "noisy", "test-token").watch("199").await.unwrap();
    let items: Vec<_> = stream.collect().await;

    assert_eq!(items.len(), 2, "items: {items:?}");
    assert!(matches!(&items[0], Err(SourceError::Malformed(m)) if m.contains("exceeds")));
    let Ok(WatchNotification::Change(next)) = &items[1] else {
        panic!("expected a change, got {:?}", items[1]);
    };
    assert_eq!(next.resource_version, "201");
    assert_eq!(next.involved_object_name.as_deref(), Some("web-8"));
}
