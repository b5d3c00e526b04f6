//! WebSocket module for kubecast
//!
//! Every connection to the configured path becomes one hub subscriber.

pub mod events;

pub use events::events_handler;

use axum::{routing::get, Router};

/// Create the WebSocket router for `path`
pub fn websocket_router(path: &str) -> Router {
    Router::new().route(path, get(events_handler))
}
