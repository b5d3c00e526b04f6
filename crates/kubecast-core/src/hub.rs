//! Fan-out hub
//!
//! Distributes every normalized event to every registered subscriber queue.
//! One mutex guards the registry; `register`, `unregister`, `publish` and
//! `shutdown` all take it, so each publish sees a consistent snapshot of the
//! live set and a subscriber registered concurrently gets all or none of it.
//! The lock is never held across an await, and delivery is a non-blocking
//! queue push, so a slow subscriber cannot stall the publisher.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::normalize::NormalizedEvent;
use crate::queue::{OutboundQueue, PushError};

/// Default per-subscriber queue depth
pub const DEFAULT_QUEUE_CAPACITY: usize = 128;

/// Queue type carried between hub and sessions
pub type EventQueue = OutboundQueue<Arc<NormalizedEvent>>;

/// Opaque subscriber identifier, unique for the process lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What to do when a subscriber's queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the slow subscriber; it must reconnect
    #[default]
    Disconnect,
    /// Discard the oldest queued event to make room
    DropOldest,
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnect => write!(f, "disconnect"),
            Self::DropOldest => write!(f, "drop_oldest"),
        }
    }
}

/// Hub configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// Per-subscriber queue depth
    pub queue_capacity: usize,
    /// Overflow handling
    pub overflow_policy: OverflowPolicy,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

/// Hub errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    /// The hub no longer accepts subscribers
    #[error("hub is shut down")]
    ShutDown,
}

/// Handle returned by [`Hub::register`].
///
/// Carries the consumer side of the subscriber's queue and a token the hub
/// cancels when it evicts the subscriber. Dropping it unregisters the
/// subscriber.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    queue: Arc<EventQueue>,
    evicted: CancellationToken,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Subscriber identifier
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// The subscriber's outbound queue
    #[must_use]
    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    /// Cancelled when the hub evicts this subscriber
    #[must_use]
    pub fn evicted(&self) -> &CancellationToken {
        &self.evicted
    }

    /// Wait for the next queued event (`None` once the hub closed the queue)
    pub async fn recv(&self) -> Option<Arc<NormalizedEvent>> {
        self.queue.pop().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            remove(&mut lock(&registry), self.id);
        }
    }
}

/// Outcome of one publish call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers the event was enqueued for
    pub delivered: usize,
    /// Older events discarded under `DropOldest`
    pub dropped: usize,
    /// Subscribers evicted under `Disconnect`
    pub evicted: usize,
}

#[derive(Debug)]
struct Registration {
    queue: Arc<EventQueue>,
    evicted: CancellationToken,
}

#[derive(Debug, Default)]
struct Registry {
    subscribers: HashMap<SubscriberId, Registration>,
    shut_down: bool,
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drop a subscriber from the live set and close its queue.
fn remove(registry: &mut Registry, id: SubscriberId) -> bool {
    match registry.subscribers.remove(&id) {
        Some(registration) => {
            registration.queue.close();
            info!(
                subscriber_id = %id,
                subscribers = registry.subscribers.len(),
                "Subscriber unregistered"
            );
            true
        }
        None => false,
    }
}

/// Fan-out hub
#[derive(Debug)]
pub struct Hub {
    registry: Arc<Mutex<Registry>>,
    config: HubConfig,
}

impl Hub {
    /// Create a hub with the given configuration
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        Self {
            registry: Arc::default(),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        lock(&self.registry)
    }

    /// Add a subscriber to the live set.
    ///
    /// The subscriber receives every event published after this call returns.
    pub fn register(&self) -> Result<Subscription, HubError> {
        let mut registry = self.lock();
        if registry.shut_down {
            return Err(HubError::ShutDown);
        }

        let id = SubscriberId::new();
        let queue = Arc::new(EventQueue::new(self.config.queue_capacity));
        let evicted = CancellationToken::new();
        registry.subscribers.insert(
            id,
            Registration {
                queue: queue.clone(),
                evicted: evicted.clone(),
            },
        );

        info!(
            subscriber_id = %id,
            subscribers = registry.subscribers.len(),
            "Subscriber registered"
        );

        Ok(Subscription {
            id,
            queue,
            evicted,
            registry: Arc::downgrade(&self.registry),
        })
    }

    /// Remove a subscriber and close its queue.
    ///
    /// Returns `false` if it was not registered (already removed, evicted, or
    /// the hub was shut down).
    pub fn unregister(&self, id: SubscriberId) -> bool {
        remove(&mut self.lock(), id)
    }

    /// Deliver an event to every registered subscriber.
    pub fn publish(&self, event: NormalizedEvent) -> PublishReport {
        let event = Arc::new(event);
        let mut report = PublishReport::default();
        let mut registry = self.lock();
        if registry.shut_down {
            return report;
        }

        let mut stale = Vec::new();
        for (id, registration) in &registry.subscribers {
            let outcome = match self.config.overflow_policy {
                OverflowPolicy::Disconnect => registration.queue.try_push(event.clone()),
                OverflowPolicy::DropOldest => registration
                    .queue
                    .push_drop_oldest(event.clone())
                    .map(|dropped| {
                        if dropped.is_some() {
                            report.dropped += 1;
                            debug!(subscriber_id = %id, "Queue full, dropped oldest event");
                        }
                    }),
            };

            match outcome {
                Ok(()) => report.delivered += 1,
                Err(PushError::Full(_)) | Err(PushError::Closed(_)) => stale.push(*id),
            }
        }

        for id in stale {
            if let Some(registration) = registry.subscribers.remove(&id) {
                registration.queue.close();
                registration.evicted.cancel();
                report.evicted += 1;
                warn!(
                    subscriber_id = %id,
                    capacity = self.config.queue_capacity,
                    "Subscriber queue overflowed, disconnecting slow subscriber"
                );
            }
        }

        report
    }

    /// Unregister and close every subscriber. Idempotent.
    ///
    /// Queued events stay poppable so sessions can flush before closing.
    pub fn shutdown(&self) {
        let mut registry = self.lock();
        if registry.shut_down {
            debug!("Hub already shut down");
            return;
        }
        registry.shut_down = true;

        let count = registry.subscribers.len();
        for (_, registration) in registry.subscribers.drain() {
            registration.queue.close();
        }
        info!(subscribers = count, "Hub shut down");
    }

    /// Number of registered subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Whether [`Hub::shutdown`] has run
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.lock().shut_down
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}
