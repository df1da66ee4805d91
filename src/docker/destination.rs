use crate::{
    config::SessionConfig,
    docker::{
        client::{expect_status, expect_success, Access, RegistrySession},
        DockerReference,
    },
    errors::ImageError,
    image::{ContentDigest, ImageName},
    manifest::guess_media_type,
    transport::ImageDestination,
};
use async_trait::async_trait;
use reqwest::{
    header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE},
    StatusCode,
};
use tokio::io::{AsyncRead, AsyncReadExt};
use url::Url;

static DOCKER_CONTENT_DIGEST: &str = "Docker-Content-Digest";

/// Writes an image to a registry
///
/// Blobs are pushed through the registry's chunked upload protocol, then the
/// manifest is stored under the reference's tag or digest. Detached signatures
/// have no place in the registry protocol.
#[derive(Debug)]
pub struct DockerImageDestination {
    reference: DockerReference,
    session: RegistrySession,
    canonical: Option<ImageName>,
}

impl DockerImageDestination {
    pub(crate) async fn new(
        reference: DockerReference,
        config: &SessionConfig,
    ) -> Result<Self, ImageError> {
        let session = RegistrySession::connect(reference.name(), config, Access::Push).await?;
        Ok(DockerImageDestination {
            reference,
            session,
            canonical: None,
        })
    }

    pub fn reference(&self) -> &DockerReference {
        &self.reference
    }

    /// `PATCH` every chunk of the stream, then `PUT` the digest to finish
    async fn upload(
        &self,
        mut location: Url,
        digest: &str,
        stream: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<(), ImageError> {
        let chunk_size = self.session.upload_chunk_size();
        let mut offset: u64 = 0;
        loop {
            let mut chunk = Vec::with_capacity(chunk_size);
            (&mut *stream)
                .take(chunk_size as u64)
                .read_to_end(&mut chunk)
                .await?;
            if chunk.is_empty() {
                break;
            }
            let end = offset + chunk.len() as u64 - 1;
            log::debug!("{} uploading bytes {}-{}", digest, offset, end);
            let range = format!("{}-{}", offset, end);
            let response = self
                .session
                .send(|req| {
                    req.patch(location.clone())
                        .header(CONTENT_TYPE, "application/octet-stream")
                        .header(CONTENT_RANGE, range.as_str())
                        .body(chunk.clone())
                })
                .await?;
            let response = expect_status(response, StatusCode::ACCEPTED)?;
            if let Some(next) = self.session.optional_location(&response)? {
                location = next;
            }
            offset = end + 1;
        }

        location
            .query_pairs_mut()
            .append_pair("digest", digest);
        let response = self
            .session
            .send(|req| req.put(location.clone()).header(CONTENT_LENGTH, 0))
            .await?;
        expect_status(response, StatusCode::CREATED)?;
        log::info!("{} uploaded, {} bytes", digest, offset);
        Ok(())
    }

    /// Best-effort cancel of an upload session that failed
    async fn cancel_upload(&self, location: Url) {
        match self.session.send(|req| req.delete(location.clone())).await {
            Ok(response) if response.status().is_success() => {
                log::debug!("cancelled upload at {}", location)
            }
            Ok(response) => log::warn!(
                "cancelling upload at {} returned {}",
                location,
                response.status()
            ),
            Err(err) => log::warn!("cancelling upload at {} failed, {}", location, err),
        }
    }
}

#[async_trait]
impl ImageDestination for DockerImageDestination {
    fn canonical_docker_reference(&self) -> Option<ImageName> {
        self.canonical.clone()
    }

    fn supports_signatures(&self) -> bool {
        false
    }

    async fn put_manifest(&mut self, manifest: &[u8]) -> Result<(), ImageError> {
        let version = self.reference.name().version();
        let url = self
            .session
            .repository_url(&format!("manifests/{}", version))?;
        let media_type = guess_media_type(manifest);
        log::info!(
            "{} <{}> storing manifest as {}",
            self.reference.name(),
            url,
            media_type
        );
        log::trace!("raw manifest, {}", String::from_utf8_lossy(manifest));
        let response = self
            .session
            .send(|req| {
                req.put(url.clone())
                    .header(CONTENT_TYPE, media_type.as_str())
                    .body(manifest.to_vec())
            })
            .await?;
        let response = expect_success(response, || {
            ImageError::ImageNotFound(self.session.repository().to_string())
        })?;

        let computed = ContentDigest::from_content(manifest);
        let digest = match response
            .headers()
            .get(DOCKER_CONTENT_DIGEST)
            .and_then(|value| value.to_str().ok())
            .map(ContentDigest::parse)
        {
            Some(Ok(reported)) => reported,
            Some(Err(err)) => {
                log::warn!("ignoring invalid digest from registry, {}", err);
                computed
            }
            None => computed,
        };
        let canonical = ImageName::from_parts(
            Some(self.session.registry().as_str()),
            self.session.repository().as_str(),
            None,
            Some(digest.as_str()),
        )?;
        log::info!("stored manifest, {}", canonical);
        self.canonical = Some(canonical);
        Ok(())
    }

    async fn put_blob(
        &mut self,
        digest: &str,
        stream: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<(), ImageError> {
        let url = self.session.repository_url("blobs/uploads/")?;
        let response = self.session.send(|req| req.post(url.clone())).await?;
        let response = expect_status(response, StatusCode::ACCEPTED)?;
        let location = self.session.location(&response)?;
        log::debug!("{} upload session at {}", digest, location);

        let result = self.upload(location.clone(), digest, stream).await;
        if result.is_err() {
            self.cancel_upload(location).await;
        }
        result
    }

    async fn put_signatures(&mut self, signatures: &[Vec<u8>]) -> Result<(), ImageError> {
        if signatures.is_empty() {
            Ok(())
        } else {
            Err(ImageError::UnsupportedOperation {
                transport: "docker",
                operation: "storing signatures",
            })
        }
    }
}
