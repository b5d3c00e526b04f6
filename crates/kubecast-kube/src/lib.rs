//! Kubecast Kube - Kubernetes access for kubecast
//!
//! This crate provides:
//! - Credential resolution (in-cluster service account, kubeconfig)
//! - An authenticated HTTP client for the API server
//! - [`KubeEventSource`], the [`kubecast_core::EventSource`] over `core/v1` events
//!
//! ```ignore
//! let creds = ClusterCredentials::load(&CredentialOptions::default())?;
//! let client = KubeClient::new(&creds, DEFAULT_REQUEST_TIMEOUT)?;
//! let source = KubeEventSource::new(client, WatchOptions::default());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod credentials;
pub mod error;
pub mod frame;
pub mod kubeconfig;
mod lines;
pub mod source;

pub use client::{KubeClient, DEFAULT_REQUEST_TIMEOUT};
pub use credentials::{
    default_kubeconfig_path, ClusterCredentials, CredentialOptions, CredentialOrigin,
};
pub use error::{Error, Result};
pub use frame::{classify_status, parse_frame};
pub use kubeconfig::Kubeconfig;
pub use source::{KubeEventSource, WatchOptions, DEFAULT_WATCH_TIMEOUT};
