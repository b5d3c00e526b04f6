//! Kubecast Core - Watch-and-Fan-Out Pipeline
//!
//! This crate provides the pipeline that relays cluster events to live
//! subscribers:
//! - Source: the `EventSource` seam to the cluster API
//! - Watcher: one resilient upstream watch with cursor resume and backoff
//! - Normalize: raw changes to the stable wire record
//! - Hub: fan-out to every registered subscriber queue
//! - Session: one subscriber connection's drain and liveness loops
//! - Shutdown: phased graceful shutdown
//!
//! ## Usage
//!
//! ```ignore
//! let hub = Arc::new(Hub::new(HubConfig::default()));
//! let shutdown = ShutdownController::new(hub.clone(), DEFAULT_GRACE_PERIOD);
//! let watcher = UpstreamWatcher::new(source, BackoffConfig::default());
//! let handle = watcher.spawn(hub.clone(), shutdown.token());
//!
//! // per connection
//! let subscription = hub.register()?;
//! let end = SubscriberSession::new(hub.clone(), subscription)
//!     .with_force_close(shutdown.force_token())
//!     .run(sink, inbound)
//!     .await;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backoff;
pub mod change;
pub mod error;
pub mod hub;
pub mod normalize;
pub mod queue;
pub mod session;
pub mod shutdown;
pub mod source;
pub mod watcher;

pub use backoff::{Backoff, BackoffConfig};
pub use change::{Change, ChangeType};
pub use error::{Error, Result};
pub use hub::{
    Hub, HubConfig, HubError, OverflowPolicy, PublishReport, SubscriberId, Subscription,
    DEFAULT_QUEUE_CAPACITY,
};
pub use normalize::{normalize, EventObject, NormalizeError, NormalizedEvent};
pub use queue::{OutboundQueue, PushError};
pub use session::{Inbound, SessionEnd, SessionState, SessionStatus, SubscriberSession};
pub use shutdown::{
    wait_for_shutdown_signal, ShutdownController, ShutdownPhase, TaskGuard, DEFAULT_GRACE_PERIOD,
};
pub use source::{EventSource, SourceError, WatchNotification, WatchStream};
pub use watcher::{relay, UpstreamWatcher, WatchError};
