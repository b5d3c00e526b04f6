//! Cluster credentials
//!
//! Resolves how to reach the API server, in this order:
//!
//! 1. an explicit kubeconfig path,
//! 2. the pod's service account when running inside a cluster,
//! 3. `$KUBECONFIG` (first entry), then `~/.kube/config`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use secrecy::SecretString;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::kubeconfig::{Kubeconfig, User};

/// Service account mount inside a pod
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

const SERVICE_HOST_ENV: &str = "KUBERNETES_SERVICE_HOST";
const SERVICE_PORT_ENV: &str = "KUBERNETES_SERVICE_PORT";

/// Where to look for credentials
#[derive(Debug, Clone, Default)]
pub struct CredentialOptions {
    /// Explicit kubeconfig file; disables in-cluster detection
    pub kubeconfig: Option<PathBuf>,
    /// Context to use instead of `current-context`
    pub context: Option<String>,
}

/// Where the credentials came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialOrigin {
    /// Pod service account
    InCluster,
    /// Kubeconfig file and the context used
    Kubeconfig {
        /// File path
        path: PathBuf,
        /// Context name
        context: String,
    },
}

impl std::fmt::Display for CredentialOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InCluster => write!(f, "in-cluster service account"),
            Self::Kubeconfig { path, context } => {
                write!(f, "kubeconfig {} (context {context})", path.display())
            }
        }
    }
}

/// Everything needed to build an authenticated API client
#[derive(Debug, Clone)]
pub struct ClusterCredentials {
    /// API server base URL, without trailing slash
    pub server: String,
    /// Bearer token
    pub token: Option<SecretString>,
    /// PEM bundle of trusted CAs
    pub ca_pem: Option<Vec<u8>>,
    /// PEM client certificate followed by its private key
    pub identity_pem: Option<Vec<u8>>,
    /// Skip server certificate verification
    pub insecure_skip_tls_verify: bool,
    /// Namespace from the context or service account
    pub default_namespace: Option<String>,
    /// Where these came from
    pub origin: CredentialOrigin,
}

impl ClusterCredentials {
    /// Resolve credentials according to `options`
    pub fn load(options: &CredentialOptions) -> Result<Self> {
        if let Some(path) = &options.kubeconfig {
            return Self::from_kubeconfig_file(path, options.context.as_deref());
        }

        if env::var_os(SERVICE_HOST_ENV).is_some() && options.context.is_none() {
            info!("Using in-cluster service account credentials");
            return Self::in_cluster();
        }

        let path = default_kubeconfig_path().ok_or_else(|| {
            Error::InvalidKubeconfig("no kubeconfig path: set KUBECONFIG or HOME".to_string())
        })?;
        Self::from_kubeconfig_file(&path, options.context.as_deref())
    }

    /// Credentials from the pod's service account
    pub fn in_cluster() -> Result<Self> {
        let host = env::var(SERVICE_HOST_ENV)
            .map_err(|_| Error::InCluster(format!("{SERVICE_HOST_ENV} is not set")))?;
        let port = env::var(SERVICE_PORT_ENV).unwrap_or_else(|_| "443".to_string());
        Self::in_cluster_from(Path::new(SERVICE_ACCOUNT_DIR), &host, &port)
    }

    /// Credentials from a service account directory and API endpoint
    pub fn in_cluster_from(dir: &Path, host: &str, port: &str) -> Result<Self> {
        let token = read_trimmed(&dir.join("token"))?;
        if token.is_empty() {
            return Err(Error::InCluster("service account token is empty".to_string()));
        }
        let ca_pem = read_file(&dir.join("ca.crt"))?;
        let default_namespace = match std::fs::read_to_string(dir.join("namespace")) {
            Ok(ns) if !ns.trim().is_empty() => Some(ns.trim().to_string()),
            _ => None,
        };

        // IPv6 literals need brackets in a URL
        let host = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]")
        } else {
            host.to_string()
        };

        Ok(Self {
            server: format!("https://{host}:{port}"),
            token: Some(SecretString::from(token)),
            ca_pem: Some(ca_pem),
            identity_pem: None,
            insecure_skip_tls_verify: false,
            default_namespace,
            origin: CredentialOrigin::InCluster,
        })
    }

    /// Credentials from a kubeconfig file
    pub fn from_kubeconfig_file(path: &Path, context: Option<&str>) -> Result<Self> {
        if !path.exists() {
            return Err(Error::KubeconfigNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let config = Kubeconfig::from_yaml(&text)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut creds = Self::from_kubeconfig(&config, context, base_dir)?;
        if let CredentialOrigin::Kubeconfig { path: origin, .. } = &mut creds.origin {
            *origin = path.to_path_buf();
        }
        debug!(origin = %creds.origin, server = %creds.server, "Loaded kubeconfig");
        Ok(creds)
    }

    /// Credentials from a parsed kubeconfig.
    ///
    /// Relative file references resolve against `base_dir`.
    pub fn from_kubeconfig(
        config: &Kubeconfig,
        context: Option<&str>,
        base_dir: &Path,
    ) -> Result<Self> {
        let context_name = context
            .map(str::to_string)
            .or_else(|| config.current_context.clone().filter(|c| !c.is_empty()))
            .ok_or_else(|| Error::InvalidKubeconfig("no current-context set".to_string()))?;
        let ctx = config
            .context(&context_name)
            .ok_or_else(|| Error::ContextNotFound(context_name.clone()))?;
        let cluster = config
            .cluster(&ctx.cluster)
            .ok_or_else(|| Error::ClusterNotFound(ctx.cluster.clone()))?;

        let user = if ctx.user.is_empty() {
            User::default()
        } else {
            config
                .user(&ctx.user)
                .cloned()
                .ok_or_else(|| Error::UserNotFound(ctx.user.clone()))?
        };
        if user.exec.is_some() {
            return Err(Error::UnsupportedAuth(format!("exec plugin for user {}", ctx.user)));
        }
        if user.auth_provider.is_some() {
            return Err(Error::UnsupportedAuth(format!("auth-provider for user {}", ctx.user)));
        }

        let server = cluster.server.trim_end_matches('/').to_string();
        if server.is_empty() {
            return Err(Error::InvalidKubeconfig(format!(
                "cluster {} has no server",
                ctx.cluster
            )));
        }

        let ca_pem = inline_or_file(
            cluster.certificate_authority_data.as_deref(),
            cluster.certificate_authority.as_deref(),
            "certificate-authority-data",
            base_dir,
        )?;

        let token = match (&user.token, &user.token_file) {
            (Some(token), _) if !token.is_empty() => Some(token.clone()),
            (_, Some(file)) => Some(read_trimmed(&resolve(base_dir, file))?),
            _ => None,
        };

        let cert = inline_or_file(
            user.client_certificate_data.as_deref(),
            user.client_certificate.as_deref(),
            "client-certificate-data",
            base_dir,
        )?;
        let key = inline_or_file(
            user.client_key_data.as_deref(),
            user.client_key.as_deref(),
            "client-key-data",
            base_dir,
        )?;
        let identity_pem = match (cert, key) {
            (Some(mut cert), Some(key)) => {
                if !cert.ends_with(b"\n") {
                    cert.push(b'\n');
                }
                cert.extend_from_slice(&key);
                Some(cert)
            }
            (None, None) => None,
            _ => {
                return Err(Error::InvalidKubeconfig(format!(
                    "user {} needs both a client certificate and a client key",
                    ctx.user
                )))
            }
        };

        Ok(Self {
            server,
            token: token.map(SecretString::from),
            ca_pem,
            identity_pem,
            insecure_skip_tls_verify: cluster.insecure_skip_tls_verify,
            default_namespace: ctx.namespace.clone().filter(|ns| !ns.is_empty()),
            origin: CredentialOrigin::Kubeconfig {
                path: base_dir.to_path_buf(),
                context: context_name,
            },
        })
    }
}

/// `$KUBECONFIG` (first entry) or `~/.kube/config`
#[must_use]
pub fn default_kubeconfig_path() -> Option<PathBuf> {
    if let Some(value) = env::var_os("KUBECONFIG") {
        if let Some(first) = env::split_paths(&value).find(|p| !p.as_os_str().is_empty()) {
            return Some(first);
        }
    }
    dirs::home_dir().map(|home| home.join(".kube").join("config"))
}

fn resolve(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| Error::io(path, e))
}

fn read_trimmed(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|e| Error::io(path, e))
}

fn inline_or_file(
    data: Option<&str>,
    file: Option<&Path>,
    field: &'static str,
    base_dir: &Path,
) -> Result<Option<Vec<u8>>> {
    if let Some(data) = data.filter(|d| !d.trim().is_empty()) {
        let decoded = STANDARD
            .decode(data.trim())
            .map_err(|source| Error::Base64 { field, source })?;
        return Ok(Some(decoded));
    }
    match file {
        Some(file) => read_file(&resolve(base_dir, file)).map(Some),
        None => Ok(None),
    }
}
