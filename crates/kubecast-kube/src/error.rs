//! Error types for kubecast-kube
//!
//! Everything here happens at startup: a credential or client error means the
//! relay cannot talk to the cluster at all.

use std::path::PathBuf;
use thiserror::Error;

/// Cluster access error
#[derive(Debug, Error)]
pub enum Error {
    /// No kubeconfig file at the resolved path
    #[error("kubeconfig not found: {}", .0.display())]
    KubeconfigNotFound(PathBuf),

    /// Kubeconfig is structurally wrong
    #[error("invalid kubeconfig: {0}")]
    InvalidKubeconfig(String),

    /// Requested or current context does not exist
    #[error("context not found: {0}")]
    ContextNotFound(String),

    /// Context points at a missing cluster entry
    #[error("cluster not found: {0}")]
    ClusterNotFound(String),

    /// Context points at a missing user entry
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// Credential plugin or auth provider that is not supported
    #[error("unsupported authentication method: {0}")]
    UnsupportedAuth(String),

    /// Service account environment is incomplete
    #[error("in-cluster configuration unavailable: {0}")]
    InCluster(String),

    /// A referenced file could not be read
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Inline `*-data` field is not valid base64
    #[error("invalid base64 in {field}: {source}")]
    Base64 {
        /// Kubeconfig field name
        field: &'static str,
        /// Underlying error
        #[source]
        source: base64::DecodeError,
    },

    /// Kubeconfig is not valid YAML
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP client could not be built (bad certificate or key)
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
