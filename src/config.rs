//! Per-session configuration for image sources and destinations

use crate::{
    docker::DefaultRegistry,
    image::Registry,
};
use reqwest::header::{HeaderMap, HeaderValue};
use std::{
    collections::HashMap,
    convert::TryInto,
    path::{Path, PathBuf},
    time::Duration,
};

/// Default size of each `PATCH` request while uploading a blob
pub const DEFAULT_UPLOAD_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Settings shared by every request in one source or destination session
///
/// The two settings every transport accepts are the certificate directory and
/// whether to verify TLS certificates. Transports without a network side
/// ignore both. Everything else here only affects registry sessions.
///
/// A session builds its network client once from these settings; they are
/// never renegotiated per request.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub(crate) cert_path: Option<PathBuf>,
    pub(crate) tls_verify: bool,
    pub(crate) request_timeout: Option<Duration>,
    pub(crate) connect_timeout: Option<Duration>,
    pub(crate) user_agent: HeaderValue,
    pub(crate) default_headers: HeaderMap,
    pub(crate) logins: HashMap<Registry, Login>,
    pub(crate) default_registry: DefaultRegistry,
    pub(crate) upload_chunk_size: usize,
}

#[derive(Clone, Debug)]
pub(crate) struct Login {
    pub username: String,
    pub password: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig::builder().build()
    }
}

impl SessionConfig {
    /// Configuration with a certificate directory and a verification mode
    ///
    /// An empty `cert_path` means the default system trust roots.
    pub fn new<P: AsRef<Path>>(cert_path: P, tls_verify: bool) -> Self {
        SessionConfig::builder()
            .cert_path(cert_path)
            .tls_verify(tls_verify)
            .build()
    }

    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::new()
    }

    /// Return the default `User-Agent` that we use if no other is set
    pub fn default_user_agent() -> HeaderValue {
        static USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
        HeaderValue::from_static(USER_AGENT)
    }

    pub fn cert_path(&self) -> Option<&Path> {
        self.cert_path.as_deref()
    }

    pub fn tls_verify(&self) -> bool {
        self.tls_verify
    }

    pub fn default_registry(&self) -> &DefaultRegistry {
        &self.default_registry
    }
}

/// Builder for [SessionConfig]
#[derive(Debug)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    pub fn new() -> Self {
        SessionConfigBuilder {
            config: SessionConfig {
                cert_path: None,
                tls_verify: true,
                request_timeout: None,
                connect_timeout: None,
                user_agent: SessionConfig::default_user_agent(),
                default_headers: HeaderMap::new(),
                logins: HashMap::new(),
                default_registry: DefaultRegistry::new(),
                upload_chunk_size: DEFAULT_UPLOAD_CHUNK_SIZE,
            },
        }
    }

    /// Directory of extra trust roots (`*.crt`) and client keypairs
    /// (`*.cert` with a matching `*.key`)
    ///
    /// An empty path leaves the default trust configuration alone.
    pub fn cert_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        let path = path.as_ref();
        self.config.cert_path = if path.as_os_str().is_empty() {
            None
        } else {
            Some(path.to_path_buf())
        };
        self
    }

    /// Enable or disable TLS certificate verification
    ///
    /// Verification is on by default.
    pub fn tls_verify(mut self, verify: bool) -> Self {
        self.config.tls_verify = verify;
        self
    }

    /// Set a timeout for each network request
    ///
    /// This timeout applies from the beginning of a request until the
    /// last byte has been received. By default there is no timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = Some(timeout);
        self
    }

    /// Set a timeout for only the initial connect phase of each network request
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Sets the `User-Agent` header
    ///
    /// Values that aren't valid header values are ignored with a warning.
    pub fn user_agent<V>(mut self, value: V) -> Self
    where
        V: TryInto<HeaderValue>,
        V::Error: Into<http::Error>,
    {
        match value.try_into() {
            Ok(value) => self.config.user_agent = value,
            Err(err) => {
                let err: http::Error = err.into();
                log::warn!("ignoring invalid user agent, {}", err);
            }
        }
        self
    }

    /// Set the default headers for every HTTP request
    pub fn default_request_headers(mut self, headers: HeaderMap) -> Self {
        self.config.default_headers = headers;
        self
    }

    /// Store a username and password for use with a particular registry
    pub fn login(mut self, registry: Registry, username: String, password: Option<String>) -> Self {
        self.config
            .logins
            .insert(registry, Login { username, password });
        self
    }

    /// Change the registry used for names that don't specify one
    ///
    /// A plain [Registry] can be converted with `into()` when none of the
    /// extra [DefaultRegistry] options are needed.
    pub fn registry(mut self, default_registry: &DefaultRegistry) -> Self {
        self.config.default_registry = default_registry.clone();
        self
    }

    /// Size of each chunk while uploading blobs to a registry
    pub fn upload_chunk_size(mut self, size: usize) -> Self {
        self.config.upload_chunk_size = size.max(1);
        self
    }

    pub fn build(self) -> SessionConfig {
        self.config
    }
}

impl Default for SessionConfigBuilder {
    fn default() -> Self {
        SessionConfigBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cert_path_means_default_trust() {
        let config = SessionConfig::new("", true);
        assert_eq!(config.cert_path(), None);
        assert!(config.tls_verify());

        let config = SessionConfig::new("/etc/docker/certs.d/quay.io", false);
        assert_eq!(
            config.cert_path(),
            Some(Path::new("/etc/docker/certs.d/quay.io"))
        );
        assert!(!config.tls_verify());
    }

    #[test]
    fn builder_settings() {
        let config = SessionConfig::builder()
            .user_agent("test-agent/1.0")
            .upload_chunk_size(0)
            .login("quay.io".parse().unwrap(), "user".into(), None)
            .build();
        assert_eq!(config.user_agent, "test-agent/1.0");
        assert_eq!(config.upload_chunk_size, 1);
        assert!(config.logins.contains_key(&"quay.io".parse::<Registry>().unwrap()));
        assert!(SessionConfig::default()
            .user_agent
            .to_str()
            .unwrap()
            .starts_with("image-transport/"));
    }
}
