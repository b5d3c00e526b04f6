//! Subscriber session
//!
//! Bridges the hub's push model onto one network connection. The drain loop
//! runs on the caller's task and writes queued events as JSON text; a
//! separate liveness task reads the inbound half so a peer that goes away is
//! noticed even while no events flow. Every failure ends this session only.
//!
//! The session is transport-agnostic: it writes `String` frames to any
//! [`Sink`] and reads [`Inbound`] signals from any [`Stream`]. The WebSocket
//! adapter lives in the server crate.

use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::hub::{Hub, SubscriberId, Subscription};

/// Upper bound on the close handshake at teardown
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Inbound traffic, as far as the session cares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// Any frame from the peer: proof of life, content ignored
    Traffic,
    /// The peer started a close handshake
    Close,
}

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Delivering events
    Active,
    /// Hub closed the queue; flushing what is left
    Draining,
    /// Torn down
    Closed,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Peer closed or dropped the connection
    PeerClosed,
    /// Writing to the connection failed
    WriteFailed,
    /// Hub evicted the subscriber for falling behind
    Evicted,
    /// Hub shut down and the queue was flushed
    HubClosed,
    /// Shutdown grace period elapsed
    ForcedClose,
}

/// Cloneable view of a session's state
#[derive(Debug, Clone)]
pub struct SessionStatus(Arc<AtomicU8>);

impl SessionStatus {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(SessionState::Active as u8)))
    }

    fn set(&self, state: SessionState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Current state
    #[must_use]
    pub fn get(&self) -> SessionState {
        match self.0.load(Ordering::SeqCst) {
            0 => SessionState::Active,
            1 => SessionState::Draining,
            _ => SessionState::Closed,
        }
    }
}

/// One live downstream subscriber
pub struct SubscriberSession {
    hub: Arc<Hub>,
    subscription: Subscription,
    force_close: CancellationToken,
    status: SessionStatus,
}

impl SubscriberSession {
    /// Wrap a registered subscription
    #[must_use]
    pub fn new(hub: Arc<Hub>, subscription: Subscription) -> Self {
        Self {
            hub,
            subscription,
            force_close: CancellationToken::new(),
            status: SessionStatus::new(),
        }
    }

    /// End the session immediately when `token` is cancelled
    #[must_use]
    pub fn with_force_close(mut self, token: CancellationToken) -> Self {
        self.force_close = token;
        self
    }

    /// Subscriber identifier
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.subscription.id()
    }

    /// Handle for observing the session state
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status.clone()
    }

    /// Run until the connection or the hub ends the session.
    ///
    /// Always unregisters from the hub and closes the sink before returning.
    pub async fn run<S, R, E>(self, mut sink: S, inbound: R) -> SessionEnd
    where
        S: Sink<String> + Unpin,
        S::Error: Display,
        R: Stream<Item = Result<Inbound, E>> + Send + Unpin + 'static,
        E: Display + Send + 'static,
    {
        let id = self.subscription.id();
        let queue = self.subscription.queue().clone();
        let evicted = self.subscription.evicted().clone();

        let peer_gone = CancellationToken::new();
        let liveness = tokio::spawn(watch_peer(id, inbound, peer_gone.clone()));

        let end = loop {
            if queue.is_closed() && self.status.get() == SessionState::Active {
                debug!(subscriber_id = %id, queued = queue.len(), "Draining subscriber queue");
                self.status.set(SessionState::Draining);
            }

            let next = tokio::select! {
                biased;
                _ = self.force_close.cancelled() => break SessionEnd::ForcedClose,
                _ = evicted.cancelled() => break SessionEnd::Evicted,
                _ = peer_gone.cancelled() => break SessionEnd::PeerClosed,
                next = queue.pop() => next,
            };

            let Some(event) = next else {
                break SessionEnd::HubClosed;
            };

            let text = match event.to_json() {
                Ok(text) => text,
                Err(e) => {
                    warn!(subscriber_id = %id, error = %e, "Failed to serialize event, skipping");
                    continue;
                }
            };

            let sent = tokio::select! {
                biased;
                _ = self.force_close.cancelled() => break SessionEnd::ForcedClose,
                _ = evicted.cancelled() => break SessionEnd::Evicted,
                result = sink.send(text) => result,
            };

            if let Err(e) = sent {
                warn!(subscriber_id = %id, error = %e, "Write to subscriber failed");
                break SessionEnd::WriteFailed;
            }
        };

        self.status.set(SessionState::Closed);
        self.hub.unregister(id);
        liveness.abort();
        if tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await.is_err() {
            debug!(subscriber_id = %id, "Close handshake timed out");
        }

        info!(subscriber_id = %id, reason = ?end, "Subscriber session ended");
        end
    }
}

/// Read the inbound half until the peer goes away, then cancel `peer_gone`.
async fn watch_peer<R, E>(id: SubscriberId, mut inbound: R, peer_gone: CancellationToken)
where
    R: Stream<Item = Result<Inbound, E>> + Unpin,
    E: Display,
{
    while let Some(frame) = inbound.next().await {
        match frame {
            Ok(Inbound::Traffic) => {
                trace!(subscriber_id = %id, "Inbound traffic");
            }
            Ok(Inbound::Close) => {
                info!(subscriber_id = %id, "Connection closed by subscriber");
                break;
            }
            Err(e) => {
                warn!(subscriber_id = %id, error = %e, "Subscriber connection error");
                break;
            }
        }
    }
    peer_gone.cancel();
}
