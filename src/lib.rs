//! Read and write container images through interchangeable transports
//!
//! Every storage backend implements the same three traits: an
//! [ImageReference] names an image, an [ImageSource] reads its manifest,
//! blobs and detached signatures, and an [ImageDestination] writes them.
//!
//! Two transports are included:
//!
//! - `dir:` stores an image as plain files in a local directory
//! - `docker://` talks to a registry server over the Docker Registry HTTP API v2
//!
//! ```no_run
//! # async fn copy() -> Result<(), image_transport::ImageError> {
//! use image_transport::{parse_image_reference, SessionConfig};
//!
//! let config = SessionConfig::new("", true);
//! let from = parse_image_reference("docker://busybox:latest")?;
//! let to = parse_image_reference("dir:/tmp/busybox")?;
//!
//! let src = from.new_image_source(&config).await?;
//! let mut dest = to.new_image_destination(&config).await?;
//! let (manifest, _media_type) = src.get_manifest(None).await?;
//! dest.put_manifest(&manifest).await?;
//! # Ok(())
//! # }
//! ```

#[macro_use] extern crate lazy_static;
#[macro_use] extern crate serde;

pub mod config;
pub mod directory;
pub mod docker;
pub mod errors;
pub mod image;
pub mod manifest;
pub mod transport;

pub use crate::{
    config::SessionConfig,
    errors::{ErrorKind, ImageError},
    image::{Image, ImageName},
    transport::{
        parse_image_reference, BlobReader, ImageDestination, ImageReference, ImageSource,
        Transport,
    },
};
