//! Images stored as plain files in a local directory
//!
//! The layout inside the directory is fixed: `manifest.json` holds the
//! manifest, each blob lives in a file named after an injective encoding of
//! its digest, and detached signatures are numbered `signature-1`,
//! `signature-2` and so on with no gaps.

mod destination;
mod lock;
mod paths;
mod source;
mod writer;

pub use destination::DirectoryImageDestination;
pub use paths::path_encode;
pub use source::DirectoryImageSource;

use crate::{
    config::SessionConfig,
    errors::ImageError,
    image::ImageName,
    transport::{ImageDestination, ImageReference, ImageSource, Transport},
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// A local directory holding one image
///
/// Directories have no Docker-style identity, so both the intended and the
/// canonical Docker references are always absent.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct DirectoryReference {
    path: PathBuf,
}

impl DirectoryReference {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        DirectoryReference { path: path.into() }
    }

    /// Parse the part of a `dir:` reference after the prefix
    pub fn parse(s: &str) -> Result<Self, ImageError> {
        if s.is_empty() {
            Err(ImageError::InvalidReferenceFormat(s.to_owned()))
        } else {
            Ok(DirectoryReference::new(s))
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn new_directory_source(&self) -> Result<DirectoryImageSource, ImageError> {
        DirectoryImageSource::new(self.clone()).await
    }

    pub async fn new_directory_destination(
        &self,
    ) -> Result<DirectoryImageDestination, ImageError> {
        DirectoryImageDestination::new(self.clone()).await
    }
}

#[async_trait]
impl ImageReference for DirectoryReference {
    fn transport(&self) -> Transport {
        Transport::Directory
    }

    fn string_within_transport(&self) -> String {
        self.path.display().to_string()
    }

    fn docker_reference(&self) -> Option<&ImageName> {
        None
    }

    /// Certificate and TLS settings have no meaning for local files
    async fn new_image_source(
        &self,
        _config: &SessionConfig,
    ) -> Result<Box<dyn ImageSource>, ImageError> {
        Ok(Box::new(self.new_directory_source().await?))
    }

    async fn new_image_destination(
        &self,
        _config: &SessionConfig,
    ) -> Result<Box<dyn ImageDestination>, ImageError> {
        Ok(Box::new(self.new_directory_destination().await?))
    }
}
