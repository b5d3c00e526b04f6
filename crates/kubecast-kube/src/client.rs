//! Authenticated API client

use reqwest::{Certificate, Client, Identity, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::warn;

use crate::credentials::ClusterCredentials;
use crate::error::Result;

/// Default timeout for non-streaming requests
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Thin wrapper over `reqwest` that knows the API server and how to authenticate
#[derive(Clone)]
pub struct KubeClient {
    http: Client,
    server: String,
    token: Option<SecretString>,
    request_timeout: Duration,
}

impl std::fmt::Debug for KubeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClient")
            .field("server", &self.server)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl KubeClient {
    /// Build a client from resolved credentials
    pub fn new(credentials: &ClusterCredentials, request_timeout: Duration) -> Result<Self> {
        let mut builder = Client::builder()
            .use_rustls_tls()
            .connect_timeout(request_timeout)
            .user_agent(concat!("kubecast/", env!("CARGO_PKG_VERSION")));

        if let Some(pem) = &credentials.ca_pem {
            for cert in Certificate::from_pem_bundle(pem)? {
                builder = builder.add_root_certificate(cert);
            }
        }
        if let Some(pem) = &credentials.identity_pem {
            builder = builder.identity(Identity::from_pem(pem)?);
        }
        if credentials.insecure_skip_tls_verify {
            warn!(server = %credentials.server, "TLS verification disabled for API server");
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            http: builder.build()?,
            server: credentials.server.clone(),
            token: credentials.token.clone(),
            request_timeout,
        })
    }

    /// API server base URL
    #[must_use]
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Timeout applied to non-streaming requests
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Authenticated GET for `path` (must start with `/`)
    pub fn get(&self, path: &str) -> RequestBuilder {
        let request = self.http.get(format!("{}{path}", self.server));
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialOrigin;

    fn credentials() -> ClusterCredentials {
        ClusterCredentials {
            server: "http://127.0.0.1:8080".to_string(),
            token: Some(SecretString::from("s3cr3t".to_string())),
            ca_pem: None,
            identity_pem: None,
            insecure_skip_tls_verify: false,
            default_namespace: None,
            origin: CredentialOrigin::InCluster,
        }
    }

    #[test]
    fn test_debug_redacts_token() {
        let client = KubeClient::new(&credentials(), DEFAULT_REQUEST_TIMEOUT).unwrap();
        let debug = format!("{client:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("s3cr3t"));
    }

    #[test]
    fn test_get_builds_url_and_auth() {
        let client = KubeClient::new(&credentials(), DEFAULT_REQUEST_TIMEOUT).unwrap();
        let request = client.get("/api/v1/events").build().unwrap();

        assert_eq!(request.url().as_str(), "http://127.0.0.1:8080/api/v1/events");
        assert_eq!(
            request.headers().get("authorization").unwrap(),
            "Bearer s3cr3t"
        );
    }
}
