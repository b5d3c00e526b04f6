//! Kubeconfig file model
//!
//! Only the fields needed to reach the API server with static credentials.

use serde::Deserialize;
use std::path::PathBuf;

/// A kubeconfig document
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Kubeconfig {
    /// Known clusters
    #[serde(default)]
    pub clusters: Vec<NamedCluster>,
    /// Known contexts
    #[serde(default)]
    pub contexts: Vec<NamedContext>,
    /// Known users
    #[serde(default)]
    pub users: Vec<NamedUser>,
    /// Context used when none is requested
    #[serde(default)]
    pub current_context: Option<String>,
}

/// `clusters[]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct NamedCluster {
    /// Entry name
    pub name: String,
    /// Cluster details
    pub cluster: Cluster,
}

/// API server endpoint and trust settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Cluster {
    /// API server URL
    pub server: String,
    /// CA bundle path
    #[serde(default)]
    pub certificate_authority: Option<PathBuf>,
    /// Base64 CA bundle
    #[serde(default)]
    pub certificate_authority_data: Option<String>,
    /// Skip server certificate verification
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,
}

/// `contexts[]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct NamedContext {
    /// Entry name
    pub name: String,
    /// Context details
    pub context: Context,
}

/// Cluster + user pairing
#[derive(Debug, Clone, Deserialize)]
pub struct Context {
    /// Cluster entry name
    pub cluster: String,
    /// User entry name
    #[serde(default)]
    pub user: String,
    /// Default namespace
    #[serde(default)]
    pub namespace: Option<String>,
}

/// `users[]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct NamedUser {
    /// Entry name
    pub name: String,
    /// Credentials
    #[serde(default)]
    pub user: User,
}

/// Static credentials
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct User {
    /// Bearer token
    #[serde(default)]
    pub token: Option<String>,
    /// File holding a bearer token
    #[serde(default, rename = "tokenFile")]
    pub token_file: Option<PathBuf>,
    /// Client certificate path
    #[serde(default)]
    pub client_certificate: Option<PathBuf>,
    /// Base64 client certificate
    #[serde(default)]
    pub client_certificate_data: Option<String>,
    /// Client key path
    #[serde(default)]
    pub client_key: Option<PathBuf>,
    /// Base64 client key
    #[serde(default)]
    pub client_key_data: Option<String>,
    /// Credential plugin (unsupported)
    #[serde(default)]
    pub exec: Option<serde_yaml::Value>,
    /// Auth provider plugin (unsupported)
    #[serde(default)]
    pub auth_provider: Option<serde_yaml::Value>,
}

impl Kubeconfig {
    /// Parse kubeconfig YAML
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// Look up a context by name
    #[must_use]
    pub fn context(&self, name: &str) -> Option<&Context> {
        self.contexts
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.context)
    }

    /// Look up a cluster by name
    #[must_use]
    pub fn cluster(&self, name: &str) -> Option<&Cluster> {
        self.clusters
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.cluster)
    }

    /// Look up a user by name
    #[must_use]
    pub fn user(&self, name: &str) -> Option<&User> {
        self.users.iter().find(|u| u.name == name).map(|u| &u.user)
    }
}
