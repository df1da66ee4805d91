use crate::{
    config::SessionConfig,
    docker::{
        client::{expect_success, Access, RegistrySession},
        DockerReference,
    },
    errors::ImageError,
    image::{ContentDigest, ImageName, ImageVersion},
    manifest::media_types,
    transport::{BlobReader, ImageSource},
};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::io;
use tokio_util::io::StreamReader;

/// Reads an image from a registry
#[derive(Debug)]
pub struct DockerImageSource {
    reference: DockerReference,
    pub(crate) session: RegistrySession,
}

impl DockerImageSource {
    pub(crate) async fn new(
        reference: DockerReference,
        config: &SessionConfig,
    ) -> Result<Self, ImageError> {
        let session = RegistrySession::connect(reference.name(), config, Access::Pull).await?;
        Ok(DockerImageSource { reference, session })
    }

    pub fn reference(&self) -> &DockerReference {
        &self.reference
    }
}

#[async_trait]
impl ImageSource for DockerImageSource {
    fn intended_docker_reference(&self) -> Option<&ImageName> {
        Some(self.reference.name())
    }

    async fn get_manifest(
        &self,
        instance_digest: Option<&ContentDigest>,
    ) -> Result<(Vec<u8>, String), ImageError> {
        let version = match instance_digest {
            Some(digest) => ImageVersion::ContentDigest(digest.clone()),
            None => self.reference.name().version(),
        };
        let url = self
            .session
            .repository_url(&format!("manifests/{}", version))?;
        log::info!("{} <{}> downloading manifest...", self.reference.name(), url);
        let accept = media_types::ACCEPTED.join(", ");
        let response = self
            .session
            .send(|req| req.get(url.clone()).header(ACCEPT, accept.as_str()))
            .await?;
        let response = expect_success(response, || {
            ImageError::ManifestNotFound(format!("{}:{}", self.session.repository(), version))
        })?;
        let media_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        let manifest = response.bytes().await?.to_vec();
        if let Some(digest) = version.content_digest() {
            digest.verify(&manifest)?;
        }
        log::trace!("raw manifest, {}", String::from_utf8_lossy(&manifest));
        Ok((manifest, media_type))
    }

    async fn get_blob(&self, digest: &str) -> Result<BlobReader, ImageError> {
        let url = self.session.blob_url(digest)?;
        let response = self.session.send(|req| req.get(url.clone())).await?;
        let response = expect_success(response, || ImageError::BlobNotFound(digest.to_owned()))?;
        let size = response.content_length();
        log::debug!("{} downloading, {:?} bytes", digest, size);
        let stream = response
            .bytes_stream()
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err));
        Ok(BlobReader::new(digest, size, StreamReader::new(stream)))
    }

    async fn get_signatures(&self) -> Result<Vec<Vec<u8>>, ImageError> {
        Ok(Vec::new())
    }

    async fn delete(&self) -> Result<(), ImageError> {
        Err(ImageError::UnsupportedOperation {
            transport: "docker",
            operation: "deleting images",
        })
    }
}
