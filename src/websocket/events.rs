//! Events WebSocket handler
//!
//! Streams normalized cluster events to the client, one JSON text frame per
//! event. Client frames are not interpreted.

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension,
};
use futures::{future, SinkExt, StreamExt};
use kubecast_core::{Hub, Inbound, ShutdownController, SubscriberSession};
use std::sync::Arc;
use tracing::{debug, info};

/// WebSocket upgrade handler
pub async fn events_handler(
    ws: WebSocketUpgrade,
    Extension(hub): Extension<Arc<Hub>>,
    Extension(shutdown): Extension<Arc<ShutdownController>>,
) -> Response {
    if shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, hub, shutdown))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, hub: Arc<Hub>, shutdown: Arc<ShutdownController>) {
    let _guard = shutdown.register_task();

    let subscription = match hub.register() {
        Ok(subscription) => subscription,
        Err(e) => {
            debug!(error = %e, "Rejecting subscriber");
            let _ = socket.close().await;
            return;
        }
    };

    let session =
        SubscriberSession::new(hub.clone(), subscription).with_force_close(shutdown.force_token());
    info!(
        subscriber_id = %session.id(),
        subscribers = hub.subscriber_count(),
        "WebSocket subscriber connected"
    );

    let (sender, receiver) = socket.split();
    let sink = sender.with(|text: String| future::ready(Ok::<_, axum::Error>(Message::Text(text))));
    let inbound = receiver.map(|frame| {
        frame.map(|message| match message {
            Message::Close(_) => Inbound::Close,
            _ => Inbound::Traffic,
        })
    });

    session.run(sink, inbound).await;
}
