//! Graceful shutdown
//!
//! Sequences process shutdown across the pipeline:
//!
//! 1. cancel the watcher and the listener (`token()`),
//! 2. shut the hub down so every session starts flushing its queue,
//! 3. wait for registered session tasks, up to the grace period,
//! 4. cancel `force_token()` so any remaining session closes at once.
//!
//! ```ignore
//! let shutdown = ShutdownController::new(hub.clone(), Duration::from_secs(10));
//! watcher.spawn(hub, shutdown.token());
//! let guard = shutdown.register_task(); // per session
//! shutdown.shutdown().await;
//! ```

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::hub::Hub;

/// Default grace period for sessions to flush
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

const CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Upper bound on waiting for sessions after a forced close
const FORCE_WAIT: Duration = Duration::from_secs(1);

/// Shutdown phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    /// Normal operation
    Running,
    /// Watcher and listener cancelled, hub shut down
    Stopping,
    /// Waiting for sessions to flush
    Draining,
    /// Grace period exceeded, force-closing sessions
    Terminating,
    /// Shutdown complete
    Terminated,
}

impl std::fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Stopping => write!(f, "Stopping"),
            Self::Draining => write!(f, "Draining"),
            Self::Terminating => write!(f, "Terminating"),
            Self::Terminated => write!(f, "Terminated"),
        }
    }
}

/// Coordinates graceful shutdown of the relay
pub struct ShutdownController {
    cancel_token: CancellationToken,
    force_token: CancellationToken,
    phase: AtomicU32,
    shutdown_initiated: AtomicBool,
    active_tasks: AtomicU32,
    grace_period: Duration,
    hub: Arc<Hub>,
}

impl ShutdownController {
    /// Create a controller for `hub`
    #[must_use]
    pub fn new(hub: Arc<Hub>, grace_period: Duration) -> Arc<Self> {
        Arc::new(Self {
            cancel_token: CancellationToken::new(),
            force_token: CancellationToken::new(),
            phase: AtomicU32::new(ShutdownPhase::Running as u32),
            shutdown_initiated: AtomicBool::new(false),
            active_tasks: AtomicU32::new(0),
            grace_period,
            hub,
        })
    }

    /// Token cancelled when shutdown starts (watcher, listener)
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    /// Token cancelled when the grace period runs out (sessions)
    #[must_use]
    pub fn force_token(&self) -> CancellationToken {
        self.force_token.child_token()
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> ShutdownPhase {
        match self.phase.load(Ordering::SeqCst) {
            0 => ShutdownPhase::Running,
            1 => ShutdownPhase::Stopping,
            2 => ShutdownPhase::Draining,
            3 => ShutdownPhase::Terminating,
            _ => ShutdownPhase::Terminated,
        }
    }

    /// Whether shutdown has started
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_initiated.load(Ordering::SeqCst)
    }

    /// Track a session task until the guard drops
    #[must_use]
    pub fn register_task(self: &Arc<Self>) -> TaskGuard {
        self.active_tasks.fetch_add(1, Ordering::SeqCst);
        TaskGuard {
            controller: self.clone(),
        }
    }

    /// Number of live tracked tasks
    #[must_use]
    pub fn active_task_count(&self) -> u32 {
        self.active_tasks.load(Ordering::SeqCst)
    }

    fn set_phase(&self, phase: ShutdownPhase) {
        self.phase.store(phase as u32, Ordering::SeqCst);
        info!(phase = %phase, "Shutdown phase changed");
    }

    /// Run the shutdown sequence. Later calls are no-ops.
    pub async fn shutdown(&self) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Shutdown already initiated");
            return;
        }

        info!("Initiating graceful shutdown...");

        self.set_phase(ShutdownPhase::Stopping);
        self.cancel_token.cancel();
        self.hub.shutdown();

        self.set_phase(ShutdownPhase::Draining);
        if !self.wait_for_tasks(self.grace_period).await {
            warn!(
                active_tasks = self.active_task_count(),
                grace_secs = self.grace_period.as_secs(),
                "Grace period exceeded, force closing sessions"
            );
            self.set_phase(ShutdownPhase::Terminating);
            self.force_token.cancel();
            if !self.wait_for_tasks(FORCE_WAIT).await {
                warn!(
                    active_tasks = self.active_task_count(),
                    "Sessions still running after force close"
                );
            }
        } else {
            info!("All sessions closed gracefully");
        }

        self.set_phase(ShutdownPhase::Terminated);
        info!("Graceful shutdown complete");
    }

    /// Poll until no tasks remain; `false` on timeout.
    async fn wait_for_tasks(&self, limit: Duration) -> bool {
        let start = Instant::now();
        loop {
            let active = self.active_task_count();
            if active == 0 {
                return true;
            }
            if start.elapsed() >= limit {
                return false;
            }
            debug!(active_tasks = active, "Waiting for sessions to close...");
            tokio::time::sleep(CHECK_INTERVAL).await;
        }
    }
}

/// Tracks one live task; decrements the count on drop.
pub struct TaskGuard {
    controller: Arc<ShutdownController>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.controller.active_tasks.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Wait for Ctrl+C or SIGTERM
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
