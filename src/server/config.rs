//! Server configuration types

use anyhow::{bail, Context, Result};
use kubecast_core::{BackoffConfig, HubConfig, OverflowPolicy, DEFAULT_QUEUE_CAPACITY};
use kubecast_kube::{CredentialOptions, WatchOptions};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub hub: HubSection,
    #[serde(default)]
    pub watch: WatchSection,
    #[serde(default)]
    pub cluster: ClusterSection,
    #[serde(default)]
    pub shutdown: ShutdownSection,
}

/// Listening endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// WebSocket route
    #[serde(default = "default_path")]
    pub path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path: default_path(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    7008
}

fn default_path() -> String {
    "/ws".to_string()
}

/// Fan-out hub settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubSection {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,
}

impl Default for HubSection {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

/// Upstream watch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchSection {
    /// Empty means all namespaces
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub field_selector: String,
    #[serde(default = "default_watch_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            field_selector: String::new(),
            timeout_secs: default_watch_timeout(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            backoff_max_secs: default_backoff_max_secs(),
            jitter: true,
        }
    }
}

fn default_watch_timeout() -> u64 {
    300
}

fn default_backoff_initial_ms() -> u64 {
    500
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_backoff_max_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

/// Cluster access settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSection {
    /// Empty means auto-detect
    #[serde(default)]
    pub kubeconfig: String,
    #[serde(default)]
    pub context: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ClusterSection {
    fn default() -> Self {
        Self {
            kubeconfig: String::new(),
            context: String::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    30
}

/// Shutdown settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownSection {
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
}

impl Default for ShutdownSection {
    fn default() -> Self {
        Self {
            grace_secs: default_grace_secs(),
        }
    }
}

fn default_grace_secs() -> u64 {
    10
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

impl AppConfig {
    /// Reject settings the relay cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            bail!("server.port must be non-zero");
        }
        if !self.server.path.starts_with('/') {
            bail!("server.path must start with '/': {:?}", self.server.path);
        }
        if self.server.path == "/health" {
            bail!("server.path conflicts with the /health endpoint");
        }
        if self.hub.queue_capacity == 0 {
            bail!("hub.queue_capacity must be at least 1");
        }
        if self.watch.backoff_multiplier.is_nan() || self.watch.backoff_multiplier < 1.0 {
            bail!(
                "watch.backoff_multiplier must be >= 1.0, got {}",
                self.watch.backoff_multiplier
            );
        }
        if self.watch.backoff_initial_ms == 0 {
            bail!("watch.backoff_initial_ms must be non-zero");
        }
        if self.watch.timeout_secs == 0 {
            bail!("watch.timeout_secs must be non-zero");
        }
        self.listen_addr()?;
        Ok(())
    }

    /// Socket address to listen on
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .context("Invalid server address")
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            queue_capacity: self.hub.queue_capacity,
            overflow_policy: self.hub.overflow_policy,
        }
    }

    pub fn backoff_config(&self) -> BackoffConfig {
        BackoffConfig::default()
            .with_initial_delay(Duration::from_millis(self.watch.backoff_initial_ms))
            .with_max_delay(Duration::from_secs(self.watch.backoff_max_secs))
            .with_multiplier(self.watch.backoff_multiplier)
            .with_jitter(self.watch.jitter)
    }

    pub fn watch_options(&self) -> WatchOptions {
        WatchOptions {
            namespace: non_empty(&self.watch.namespace),
            field_selector: non_empty(&self.watch.field_selector),
            timeout: Duration::from_secs(self.watch.timeout_secs),
        }
    }

    pub fn credential_options(&self) -> CredentialOptions {
        CredentialOptions {
            kubeconfig: non_empty(&self.cluster.kubeconfig).map(PathBuf::from),
            context: non_empty(&self.cluster.context),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.cluster.request_timeout_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.shutdown.grace_secs)
    }
}
