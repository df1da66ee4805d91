//! One authenticated HTTP session against one repository on a registry

use crate::{
    config::{Login, SessionConfig},
    docker::auth::{Challenge, Credential},
    errors::ImageError,
    image::{ImageName, Registry, Repository},
};
use reqwest::{
    header::{LOCATION, WWW_AUTHENTICATE},
    Certificate, Identity, RequestBuilder, Response, StatusCode,
};
use std::{io, path::Path};
use tokio::{fs, sync::RwLock};
use url::Url;

/// Which operations a session will ask a token server for
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Access {
    Pull,
    Push,
}

#[derive(Debug)]
pub(crate) struct RegistrySession {
    req: reqwest::Client,
    registry: Registry,
    repository: Repository,
    base: Url,
    scope: String,
    login: Option<Login>,
    credential: RwLock<Option<Credential>>,
    upload_chunk_size: usize,
}

impl RegistrySession {
    /// Build the HTTP client for a session and check that the registry answers
    pub async fn connect(
        name: &ImageName,
        config: &SessionConfig,
        access: Access,
    ) -> Result<Self, ImageError> {
        let (registry, repository) = config.default_registry.resolve_image_name(name);
        let base = Url::parse(&registry.api_base())
            .map_err(|_| ImageError::InvalidReferenceFormat(registry.to_string()))?;
        let scope = match access {
            Access::Pull => format!("repository:{}:pull", repository),
            Access::Push => format!("repository:{}:pull,push", repository),
        };
        let session = RegistrySession {
            req: build_client(config).await?,
            login: config.logins.get(&registry).cloned(),
            credential: RwLock::new(None),
            upload_chunk_size: config.upload_chunk_size,
            registry,
            repository,
            base,
            scope,
        };
        session.ping().await?;
        Ok(session)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn upload_chunk_size(&self) -> usize {
        self.upload_chunk_size
    }

    /// `GET /v2/`, which any v2 registry answers with 200 or 401
    async fn ping(&self) -> Result<(), ImageError> {
        log::debug!("checking registry api at {}", self.base);
        let response = self.req.get(self.base.clone()).send().await?;
        match response.status() {
            status if status.is_success() || status == StatusCode::UNAUTHORIZED => Ok(()),
            status => Err(ImageError::UnexpectedStatus {
                url: self.base.to_string(),
                status,
            }),
        }
    }

    /// A URL inside this session's repository, like `manifests/latest`
    pub fn repository_url(&self, path: &str) -> Result<Url, ImageError> {
        self.resolve(&format!("{}/{}", self.repository, path))
    }

    /// Resolve a possibly relative URL from the registry, like a `Location`
    pub fn resolve(&self, url: &str) -> Result<Url, ImageError> {
        self.base.join(url).map_err(|err| ImageError::MalformedResponse {
            url: url.to_owned(),
            reason: err.to_string(),
        })
    }

    /// URL of one blob, with the digest as a single escaped path segment
    pub fn blob_url(&self, digest: &str) -> Result<Url, ImageError> {
        let mut url = self.repository_url("blobs/")?;
        url.path_segments_mut()
            .map_err(|()| ImageError::MalformedResponse {
                url: self.base.to_string(),
                reason: "registry URL cannot hold a path".to_owned(),
            })?
            .pop_if_empty()
            .push(digest);
        Ok(url)
    }

    /// The `Location` header of a response, resolved against the registry
    pub fn location(&self, response: &Response) -> Result<Url, ImageError> {
        self.optional_location(response)?
            .ok_or_else(|| ImageError::MalformedResponse {
                url: response.url().to_string(),
                reason: "missing Location header".to_owned(),
            })
    }

    /// Like [RegistrySession::location], but a missing header is `None`
    ///
    /// A header that is present and can't be used is still an error.
    pub fn optional_location(&self, response: &Response) -> Result<Option<Url>, ImageError> {
        let value = match response.headers().get(LOCATION) {
            Some(value) => value,
            None => return Ok(None),
        };
        let location = value.to_str().map_err(|err| ImageError::MalformedResponse {
            url: response.url().to_string(),
            reason: format!("unreadable Location header, {}", err),
        })?;
        self.resolve(location).map(Some)
    }

    /// Send a request, answering at most one authentication challenge
    ///
    /// The request is built twice when the first attempt is refused, so the
    /// builder function must not consume anything it can't rebuild.
    pub async fn send<F>(&self, build: F) -> Result<Response, ImageError>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder,
    {
        let first = self.authorize(build(&self.req)).await;
        let response = first.send().await?;
        log::debug!("{} {}", response.status(), response.url());
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }
        let header = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let challenge = match header {
            Some(header) => Challenge::parse(&header)?,
            None => return Ok(response),
        };
        let credential = challenge
            .respond(&self.registry, self.login.as_ref(), &self.req, &self.scope)
            .await?;
        let retry = credential.apply(build(&self.req));
        *self.credential.write().await = Some(credential);
        let response = retry.send().await?;
        log::debug!("{} {} (authenticated)", response.status(), response.url());
        Ok(response)
    }

    async fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &*self.credential.read().await {
            Some(credential) => credential.apply(req),
            None => req,
        }
    }
}

/// Map any non-success status to an error, with 404 as `not_found`
pub(crate) fn expect_success<F>(response: Response, not_found: F) -> Result<Response, ImageError>
where
    F: FnOnce() -> ImageError,
{
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else if status == StatusCode::NOT_FOUND {
        Err(not_found())
    } else {
        Err(ImageError::UnexpectedStatus {
            url: response.url().to_string(),
            status,
        })
    }
}

/// Require one exact status
pub(crate) fn expect_status(response: Response, expected: StatusCode) -> Result<Response, ImageError> {
    let status = response.status();
    if status == expected {
        Ok(response)
    } else {
        Err(ImageError::UnexpectedStatus {
            url: response.url().to_string(),
            status,
        })
    }
}

async fn build_client(config: &SessionConfig) -> Result<reqwest::Client, ImageError> {
    let mut builder = reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .default_headers(config.default_headers.clone())
        .danger_accept_invalid_certs(!config.tls_verify);
    if let Some(timeout) = config.request_timeout {
        builder = builder.timeout(timeout);
    }
    if let Some(timeout) = config.connect_timeout {
        builder = builder.connect_timeout(timeout);
    }
    if let Some(cert_path) = &config.cert_path {
        builder = add_cert_dir(builder, cert_path).await?;
    }
    Ok(builder.build()?)
}

/// Load a `certs.d`-style directory
///
/// Each `*.crt` is a trusted root. A `*.cert` file and the `*.key` file with
/// the same stem together form a client identity. A directory which doesn't
/// exist adds nothing.
async fn add_cert_dir(
    mut builder: reqwest::ClientBuilder,
    dir: &Path,
) -> Result<reqwest::ClientBuilder, ImageError> {
    let tls_error = |path: &Path, reason: String| ImageError::TlsConfiguration {
        path: path.to_path_buf(),
        reason,
    };
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            log::debug!("certificate directory {:?} does not exist", dir);
            return Ok(builder);
        }
        Err(err) => return Err(ImageError::storage(dir)(err)),
    };
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(ImageError::storage(dir))? {
        paths.push(entry.path());
    }
    paths.sort();

    for path in &paths {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("crt") => {
                let pem = fs::read(path).await.map_err(ImageError::storage(path))?;
                let certificate =
                    Certificate::from_pem(&pem).map_err(|err| tls_error(path, err.to_string()))?;
                log::debug!("trusting root certificate {:?}", path);
                builder = builder.add_root_certificate(certificate);
            }
            Some("cert") => {
                let key_path = path.with_extension("key");
                if !paths.contains(&key_path) {
                    return Err(tls_error(path, "missing client key".to_owned()));
                }
                let mut pem = fs::read(path).await.map_err(ImageError::storage(path))?;
                pem.push(b'\n');
                pem.extend(fs::read(&key_path).await.map_err(ImageError::storage(&key_path))?);
                let identity =
                    Identity::from_pem(&pem).map_err(|err| tls_error(path, err.to_string()))?;
                log::debug!("using client certificate {:?}", path);
                builder = builder.identity(identity);
            }
            Some("key") => {
                if !paths.contains(&path.with_extension("cert")) {
                    return Err(tls_error(path, "missing client certificate".to_owned()));
                }
            }
            _ => (),
        }
    }
    Ok(builder)
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn cert_dir_pairs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("client.key"), b"not a key").unwrap();
        let err = add_cert_dir(reqwest::Client::builder(), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ImageError::TlsConfiguration { .. }));
    }

    #[tokio::test]
    async fn cert_dir_missing_or_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README"), b"ignored").unwrap();
        assert!(add_cert_dir(reqwest::Client::builder(), dir.path())
            .await
            .is_ok());
        assert!(
            add_cert_dir(reqwest::Client::builder(), &dir.path().join("nonexistent"))
                .await
                .is_ok()
        );
    }
}
