//! Images on a registry server speaking the Docker Registry HTTP API v2

mod auth;
mod client;
mod default;
mod destination;
mod image;
mod source;

pub use default::DefaultRegistry;
pub use destination::DockerImageDestination;
pub use image::DockerImage;
pub use source::DockerImageSource;

use crate::{
    config::SessionConfig,
    errors::ImageError,
    image::ImageName,
    transport::{ImageDestination, ImageReference, ImageSource, Transport},
};
use async_trait::async_trait;

/// A Docker-style image name, used through the `docker://` transport
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct DockerReference {
    name: ImageName,
}

impl DockerReference {
    pub fn new(name: ImageName) -> Self {
        DockerReference { name }
    }

    /// Parse the part of a `docker:` reference after the prefix, which must
    /// start with `//`
    ///
    /// ```
    /// # use image_transport::docker::DockerReference;
    /// let reference = DockerReference::parse("//quay.io/fedora/fedora:34").unwrap();
    /// assert_eq!(reference.name().as_str(), "quay.io/fedora/fedora:34");
    /// assert!(DockerReference::parse("quay.io/fedora/fedora:34").is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self, ImageError> {
        match s.strip_prefix("//") {
            Some(name) => Ok(DockerReference::new(ImageName::parse(name)?)),
            None => Err(ImageError::InvalidReferenceFormat(s.to_owned())),
        }
    }

    pub fn name(&self) -> &ImageName {
        &self.name
    }

    pub async fn new_docker_source(
        &self,
        config: &SessionConfig,
    ) -> Result<DockerImageSource, ImageError> {
        DockerImageSource::new(self.clone(), config).await
    }

    pub async fn new_docker_destination(
        &self,
        config: &SessionConfig,
    ) -> Result<DockerImageDestination, ImageError> {
        DockerImageDestination::new(self.clone(), config).await
    }

    /// Open a read session wrapped with registry-only extras like tag listing
    pub async fn new_docker_image(&self, config: &SessionConfig) -> Result<DockerImage, ImageError> {
        Ok(DockerImage::new(self.new_docker_source(config).await?))
    }
}

impl From<ImageName> for DockerReference {
    fn from(name: ImageName) -> Self {
        DockerReference::new(name)
    }
}

#[async_trait]
impl ImageReference for DockerReference {
    fn transport(&self) -> Transport {
        Transport::Docker
    }

    fn string_within_transport(&self) -> String {
        format!("//{}", self.name)
    }

    fn docker_reference(&self) -> Option<&ImageName> {
        Some(&self.name)
    }

    async fn new_image_source(
        &self,
        config: &SessionConfig,
    ) -> Result<Box<dyn ImageSource>, ImageError> {
        Ok(Box::new(self.new_docker_source(config).await?))
    }

    async fn new_image_destination(
        &self,
        config: &SessionConfig,
    ) -> Result<Box<dyn ImageDestination>, ImageError> {
        Ok(Box::new(self.new_docker_destination(config).await?))
    }
}
