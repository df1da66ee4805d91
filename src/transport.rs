//! The contract every storage backend implements
//!
//! An [ImageReference] names one image within one transport. It hands out an
//! [ImageSource] for reading and an [ImageDestination] for writing, each bound
//! to that image and to a session built from a [SessionConfig].

use crate::{
    config::SessionConfig,
    directory::DirectoryReference,
    docker::DockerReference,
    errors::ImageError,
    image::{ContentDigest, Image, ImageName},
};
use async_trait::async_trait;
use pin_project::pin_project;
use std::{
    fmt,
    io,
    pin::Pin,
    str::FromStr,
    task::{Context, Poll},
};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

/// A storage backend kind, and its prefix in transport-qualified references
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Transport {
    /// Local directory (`dir:/some/path`)
    Directory,
    /// Docker Registry HTTP API v2 (`docker://name`)
    Docker,
}

impl Transport {
    pub fn name(&self) -> &'static str {
        match self {
            Transport::Directory => "dir",
            Transport::Docker => "docker",
        }
    }
}

impl FromStr for Transport {
    type Err = ImageError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dir" => Ok(Transport::Directory),
            "docker" => Ok(Transport::Docker),
            other => Err(ImageError::UnknownTransport(other.to_owned())),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parse a transport-qualified reference like `dir:/tmp/image` or
/// `docker://busybox:latest`
///
/// ```
/// # use image_transport::{parse_image_reference, Transport};
/// let reference = parse_image_reference("dir:/var/lib/images/busybox").unwrap();
/// assert_eq!(reference.transport(), Transport::Directory);
/// assert!(reference.docker_reference().is_none());
/// ```
pub fn parse_image_reference(s: &str) -> Result<Box<dyn ImageReference>, ImageError> {
    let (transport, within) = s
        .split_once(':')
        .ok_or_else(|| ImageError::InvalidReferenceFormat(s.to_owned()))?;
    Ok(match transport.parse::<Transport>()? {
        Transport::Directory => Box::new(DirectoryReference::parse(within)?),
        Transport::Docker => Box::new(DockerReference::parse(within)?),
    })
}

/// A reference to one image, within one transport
#[async_trait]
pub trait ImageReference: fmt::Debug + Send + Sync {
    fn transport(&self) -> Transport;

    /// The reference without its transport prefix, in a form
    /// [parse_image_reference] accepts back after the prefix
    fn string_within_transport(&self) -> String;

    /// The Docker-style name of this image, if the transport has one
    ///
    /// Storage with no Docker identity, like a bare local directory, returns
    /// `None` rather than an empty or made-up name.
    fn docker_reference(&self) -> Option<&ImageName>;

    /// Start a read session
    async fn new_image_source(
        &self,
        config: &SessionConfig,
    ) -> Result<Box<dyn ImageSource>, ImageError>;

    /// Start a write session
    async fn new_image_destination(
        &self,
        config: &SessionConfig,
    ) -> Result<Box<dyn ImageDestination>, ImageError>;

    /// Start a read session wrapped in an [Image]
    async fn new_image(&self, config: &SessionConfig) -> Result<Image, ImageError> {
        Ok(Image::new(self.new_image_source(config).await?))
    }
}

impl fmt::Display for dyn ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.transport(), self.string_within_transport())
    }
}

/// The read side of one image
///
/// Any number of reads may run at once on a shared reference.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// The name this image was requested under, if it has a Docker-style name
    fn intended_docker_reference(&self) -> Option<&ImageName>;

    /// Manifest bytes and a media type hint, which may be empty
    ///
    /// With an `instance_digest`, this selects one manifest out of a
    /// multi-manifest index instead of the default manifest.
    async fn get_manifest(
        &self,
        instance_digest: Option<&ContentDigest>,
    ) -> Result<(Vec<u8>, String), ImageError>;

    /// Open the blob stored under a digest
    async fn get_blob(&self, digest: &str) -> Result<BlobReader, ImageError>;

    /// Detached signatures in the order they were stored, or an empty list
    async fn get_signatures(&self) -> Result<Vec<Vec<u8>>, ImageError>;

    /// Remove everything stored for this image
    async fn delete(&self) -> Result<(), ImageError>;
}

#[async_trait]
impl ImageSource for Box<dyn ImageSource> {
    fn intended_docker_reference(&self) -> Option<&ImageName> {
        (**self).intended_docker_reference()
    }

    async fn get_manifest(
        &self,
        instance_digest: Option<&ContentDigest>,
    ) -> Result<(Vec<u8>, String), ImageError> {
        (**self).get_manifest(instance_digest).await
    }

    async fn get_blob(&self, digest: &str) -> Result<BlobReader, ImageError> {
        (**self).get_blob(digest).await
    }

    async fn get_signatures(&self) -> Result<Vec<Vec<u8>>, ImageError> {
        (**self).get_signatures().await
    }

    async fn delete(&self) -> Result<(), ImageError> {
        (**self).delete().await
    }
}

/// The write side of one image
///
/// Writes take `&mut self`: a destination performs one write at a time.
#[async_trait]
pub trait ImageDestination: Send + Sync {
    /// The digest-qualified name of what has been written so far
    ///
    /// This is `None` until a manifest has been stored, and always `None` for
    /// storage with no Docker-style identity.
    fn canonical_docker_reference(&self) -> Option<ImageName>;

    /// Can this destination store detached signatures at all?
    fn supports_signatures(&self) -> bool;

    /// Store the manifest, replacing any previous one
    async fn put_manifest(&mut self, manifest: &[u8]) -> Result<(), ImageError>;

    /// Consume a stream and store its bytes under `digest`
    ///
    /// The content is not checked against the digest here. A failed write
    /// never leaves partial content visible under that digest.
    async fn put_blob(
        &mut self,
        digest: &str,
        stream: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<(), ImageError>;

    /// Replace the entire list of detached signatures
    async fn put_signatures(&mut self, signatures: &[Vec<u8>]) -> Result<(), ImageError>;
}

/// A stream of blob content, and the blob's size when known ahead of time
///
/// The underlying file handle or network connection is released exactly once,
/// when the reader is dropped or [BlobReader::close] is called, whether or not
/// the content was read to the end.
#[pin_project]
pub struct BlobReader {
    #[pin]
    inner: Pin<Box<dyn AsyncRead + Send>>,
    digest: String,
    size: Option<u64>,
}

impl BlobReader {
    pub fn new<R>(digest: &str, size: Option<u64>, inner: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        BlobReader {
            inner: Box::pin(inner),
            digest: digest.to_owned(),
            size,
        }
    }

    /// The digest this blob was requested by
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Size in bytes, if the backend could report it before streaming
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Read the rest of the blob into memory, then release it
    pub async fn read_to_vec(mut self) -> Result<Vec<u8>, ImageError> {
        let mut buffer = Vec::with_capacity(self.size.unwrap_or(0).min(1 << 20) as usize);
        self.read_to_end(&mut buffer).await?;
        Ok(buffer)
    }

    /// Release the underlying resource without reading further
    pub fn close(self) {
        log::trace!("closing blob reader for {}", self.digest);
    }
}

impl AsyncRead for BlobReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.project().inner.poll_read(cx, buf)
    }
}

impl fmt::Debug for BlobReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobReader")
            .field("digest", &self.digest)
            .field("size", &self.size)
            .finish()
    }
}
