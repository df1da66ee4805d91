//! Error types you might see while reading or writing container images

use std::{io, path::PathBuf};
use thiserror::Error;

/// Errors from image references, sources and destinations
#[derive(Error, Debug)]
pub enum ImageError {
    /// invalid image reference format
    #[error("invalid image reference format: {0:?}")]
    InvalidReferenceFormat(String),

    /// unknown transport name in a transport-qualified reference
    #[error("unknown transport {0:?}")]
    UnknownTransport(String),

    /// no manifest is stored for this image
    #[error("manifest not found: {0}")]
    ManifestNotFound(String),

    /// no blob is stored under this digest
    #[error("blob not found: {0}")]
    BlobNotFound(String),

    /// nothing has ever been stored for this image
    #[error("image not found: {0}")]
    ImageNotFound(String),

    /// the local directory backing an image source does not exist
    #[error("image directory {0:?} does not exist")]
    DirectoryMissing(PathBuf),

    /// local storage failure
    #[error("storage io error at {path:?}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// i/o error while streaming content
    #[error("stream io error: {0}")]
    Stream(#[from] io::Error),

    /// a blocking filesystem task did not finish
    #[error("task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    /// network request error
    #[error("network request error: {0}")]
    NetworkRequest(#[from] reqwest::Error),

    /// registry server answered with a status we can't use
    #[error("unexpected status {status} from {url}")]
    UnexpectedStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    /// registry server sent a response we can't interpret
    #[error("malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },

    /// registry server requested an unsupported type of authentication
    #[error("registry server requested an unsupported type of authentication: {0:?}")]
    UnsupportedAuthentication(String),

    /// certificate directory could not be loaded into the session
    #[error("tls configuration error for {path:?}: {reason}")]
    TlsConfiguration { path: PathBuf, reason: String },

    /// this transport has no way to perform the operation
    #[error("{operation} is not supported by the {transport} transport")]
    UnsupportedOperation {
        transport: &'static str,
        operation: &'static str,
    },

    /// calculated digest of downloaded content is not what we asked for
    #[error("calculated digest of downloaded content is not what we asked for, expected {expected}, found {found}")]
    ContentDigestMismatch {
        expected: crate::image::ContentDigest,
        found: crate::image::ContentDigest,
    },
}

/// Broad classification of an [ImageError]
///
/// Callers which only care about the category of a failure, for example to
/// decide whether a missing image is fatal, can match on this instead of the
/// individual error variants.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// requested manifest, blob, signature or image does not exist
    NotFound,
    /// network or protocol failure, or the session could not be established
    Connection,
    /// operation has no meaning for this transport
    UnsupportedOperation,
    /// local filesystem failure unrelated to existence
    Io,
    /// a reference or digest string could not be parsed
    InvalidReference,
    /// content did not hash to the digest it was requested by
    DigestMismatch,
}

impl ImageError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ImageError::InvalidReferenceFormat(_) => ErrorKind::InvalidReference,
            ImageError::UnknownTransport(_) => ErrorKind::InvalidReference,
            ImageError::ManifestNotFound(_) => ErrorKind::NotFound,
            ImageError::BlobNotFound(_) => ErrorKind::NotFound,
            ImageError::ImageNotFound(_) => ErrorKind::NotFound,
            ImageError::DirectoryMissing(_) => ErrorKind::Connection,
            ImageError::Storage { .. } => ErrorKind::Io,
            ImageError::Stream(_) => ErrorKind::Io,
            ImageError::TaskJoin(_) => ErrorKind::Io,
            ImageError::NetworkRequest(_) => ErrorKind::Connection,
            ImageError::UnexpectedStatus { .. } => ErrorKind::Connection,
            ImageError::MalformedResponse { .. } => ErrorKind::Connection,
            ImageError::UnsupportedAuthentication(_) => ErrorKind::Connection,
            ImageError::TlsConfiguration { .. } => ErrorKind::Connection,
            ImageError::UnsupportedOperation { .. } => ErrorKind::UnsupportedOperation,
            ImageError::ContentDigestMismatch { .. } => ErrorKind::DigestMismatch,
        }
    }

    /// Wrap a filesystem error with the path it happened at
    pub(crate) fn storage(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> ImageError {
        let path = path.into();
        move |source| ImageError::Storage { path, source }
    }
}
