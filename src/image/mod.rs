//! Image identity, and a generic helper for reading whole images


/// Implement comparison, hashing, parsing and formatting for an identity type
/// which keeps its validated string form in a `serialized` field
macro_rules! serialized_identity {
    ($ty:ident) => {
        impl Eq for $ty {}

        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                self.serialized.eq(&other.serialized)
            }
        }

        impl std::hash::Hash for $ty {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                self.serialized.hash(state);
            }
        }

        impl Ord for $ty {
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                self.serialized.cmp(&other.serialized)
            }
        }

        impl PartialOrd for $ty {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        impl std::str::FromStr for $ty {
            type Err = crate::errors::ImageError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $ty::parse(s)
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.serialized)
            }
        }

        impl std::fmt::Debug for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.serialized)
            }
        }
    };
}

mod digest;
mod name;
mod registry;
mod repository;
mod tag;
mod version;

pub use digest::ContentDigest;
pub use name::ImageName;
pub use registry::Registry;
pub use repository::{Repository, RepositoryIter};
pub use tag::Tag;
pub use version::ImageVersion;

use crate::{errors::ImageError, transport::BlobReader, ImageSource};
use tokio::sync::OnceCell;

/// An image read through any [ImageSource]
///
/// This holds the source by value and layers the transport-independent
/// conveniences on top of it. The manifest is fetched at most once and kept
/// for the lifetime of the [Image].
pub struct Image<S: ImageSource = Box<dyn ImageSource>> {
    src: S,
    manifest: OnceCell<(Vec<u8>, String)>,
}

impl<S: ImageSource> Image<S> {
    pub fn new(src: S) -> Self {
        Image {
            src,
            manifest: OnceCell::new(),
        }
    }

    /// The name this image was requested under, if it has a Docker-style name
    pub fn intended_docker_reference(&self) -> Option<&ImageName> {
        self.src.intended_docker_reference()
    }

    /// Manifest bytes and media type of the default manifest
    pub async fn manifest(&self) -> Result<(&[u8], &str), ImageError> {
        let (bytes, media_type) = self
            .manifest
            .get_or_try_init(|| self.src.get_manifest(None))
            .await?;
        Ok((bytes, media_type))
    }

    /// Detached signatures stored alongside the image, in insertion order
    pub async fn signatures(&self) -> Result<Vec<Vec<u8>>, ImageError> {
        self.src.get_signatures().await
    }

    /// Open one blob for reading
    pub async fn blob(&self, digest: &str) -> Result<BlobReader, ImageError> {
        self.src.get_blob(digest).await
    }

    pub fn source(&self) -> &S {
        &self.src
    }

    pub fn into_source(self) -> S {
        self.src
    }
}
