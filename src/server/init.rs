//! Server initialization and main run loop

use super::config::AppConfig;
use super::loader::load_config;
use anyhow::{Context, Result};
use axum::{Extension, Router};
use kubecast_core::{wait_for_shutdown_signal, Hub, ShutdownController, UpstreamWatcher};
use kubecast_kube::{ClusterCredentials, KubeClient, KubeEventSource};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

/// How long to wait for the listener after sessions are gone
const SERVER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolve credentials and build the cluster event source
pub fn connect_source(config: &AppConfig) -> Result<KubeEventSource> {
    let credentials = ClusterCredentials::load(&config.credential_options())
        .context("Failed to load cluster credentials")?;
    info!(
        origin = %credentials.origin,
        server = %credentials.server,
        "Cluster credentials loaded"
    );

    let client = KubeClient::new(&credentials, config.request_timeout())
        .context("Failed to build Kubernetes API client")?;
    let options = config.watch_options();
    info!(
        namespace = options.namespace.as_deref().unwrap_or("<all>"),
        field_selector = options.field_selector.as_deref().unwrap_or(""),
        "Watching cluster events"
    );
    Ok(KubeEventSource::new(client, options))
}

/// HTTP routes: WebSocket subscriptions at `server.path`, plus `/health`
pub fn build_router(config: &AppConfig, hub: Arc<Hub>, shutdown: Arc<ShutdownController>) -> Router {
    Router::new()
        .merge(crate::api::health_routes())
        .merge(crate::websocket::websocket_router(&config.server.path))
        .layer(Extension(hub))
        .layer(Extension(shutdown))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Run the relay until a signal arrives or the upstream watch fails permanently
pub async fn run() -> Result<()> {
    let config = load_config().context("Failed to load configuration")?;
    info!(
        policy = %config.hub.overflow_policy,
        queue_capacity = config.hub.queue_capacity,
        "Configuration loaded"
    );

    let source = connect_source(&config)?;

    let hub = Arc::new(Hub::new(config.hub_config()));
    let shutdown = ShutdownController::new(hub.clone(), config.grace_period());

    let mut watcher = UpstreamWatcher::new(Arc::new(source), config.backoff_config())
        .spawn(hub.clone(), shutdown.token());

    let app = build_router(&config, hub, shutdown.clone());
    let addr = config.listen_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!(
        "Listening for subscribers on ws://{}{}",
        addr, config.server.path
    );

    let server_token = shutdown.token();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_token.cancelled().await })
            .await
    });

    let mut watcher_done = None;
    let mut server_done = None;
    tokio::select! {
        _ = wait_for_shutdown_signal() => {}
        result = &mut watcher => watcher_done = Some(result),
        result = &mut server => server_done = Some(result),
    }

    shutdown.shutdown().await;

    let server_result = match server_done {
        Some(result) => Some(result),
        None => match tokio::time::timeout(SERVER_STOP_TIMEOUT, server).await {
            Ok(result) => Some(result),
            Err(_) => {
                warn!("HTTP server did not stop in time");
                None
            }
        },
    };
    let watcher_result = match watcher_done {
        Some(result) => result,
        None => watcher.await,
    };

    info!("kubecast shutdown complete");

    watcher_result
        .context("Upstream watcher task failed")?
        .context("Upstream watch failed")?;
    if let Some(result) = server_result {
        result
            .context("HTTP server task failed")?
            .context("HTTP server error")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use kubecast_core::DEFAULT_GRACE_PERIOD;
    use tower::ServiceExt;

    fn router() -> (Arc<Hub>, Router) {
        let hub = Arc::new(Hub::default());
        let shutdown = ShutdownController::new(hub.clone(), DEFAULT_GRACE_PERIOD);
        let app = build_router(&AppConfig::default(), hub.clone(), shutdown);
        (hub, app)
    }

    #[tokio::test]
    async fn test_health_reports_subscribers() {
        let (hub, app) = router();
        let _a = hub.register().unwrap();
        let _b = hub.register().unwrap();

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["subscribers"], 2);
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_plain_get_on_ws_path_is_rejected() {
        let (hub, app) = router();
        let response = app
            .oneshot(Request::get("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(response.status().is_client_error());
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let (_hub, app) = router();
        let response = app
            .oneshot(Request::get("/events").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
