use crate::{
    directory::{lock::DirectoryLock, paths::LayoutKey, DirectoryReference},
    errors::ImageError,
    image::{ContentDigest, ImageName},
    transport::{BlobReader, ImageSource},
};
use async_trait::async_trait;
use std::{io, path::Path};
use tokio::fs::{self, File};

/// Reads an image stored as files in a local directory
#[derive(Debug)]
pub struct DirectoryImageSource {
    reference: DirectoryReference,
}

impl DirectoryImageSource {
    pub(crate) async fn new(reference: DirectoryReference) -> Result<Self, ImageError> {
        match fs::metadata(reference.path()).await {
            Ok(metadata) if metadata.is_dir() => Ok(DirectoryImageSource { reference }),
            Ok(_) => Err(ImageError::DirectoryMissing(reference.path().to_path_buf())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(ImageError::DirectoryMissing(reference.path().to_path_buf()))
            }
            Err(err) => Err(ImageError::storage(reference.path())(err)),
        }
    }

    pub fn reference(&self) -> &DirectoryReference {
        &self.reference
    }

    fn path(&self, key: &LayoutKey) -> std::path::PathBuf {
        key.to_path(self.reference.path())
    }

    /// Read `signature-1`, `signature-2`, ... up to the first gap
    async fn read_signatures(&self) -> Result<Vec<Vec<u8>>, ImageError> {
        let mut signatures = Vec::new();
        loop {
            let path = self.path(&LayoutKey::Signature(signatures.len() + 1));
            match read_optional(&path).await? {
                Some(signature) => signatures.push(signature),
                None => return Ok(signatures),
            }
        }
    }

    async fn has_layout_artifact(&self) -> Result<bool, ImageError> {
        let dir = self.reference.path();
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(ImageError::storage(dir)(err)),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(ImageError::storage(dir))?
        {
            if LayoutKey::is_artifact_name(&entry.file_name().to_string_lossy()) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Read a whole file, treating a missing file as `None`
async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, ImageError> {
    match fs::read(path).await {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(ImageError::storage(path)(err)),
    }
}

#[async_trait]
impl ImageSource for DirectoryImageSource {
    fn intended_docker_reference(&self) -> Option<&ImageName> {
        None
    }

    async fn get_manifest(
        &self,
        instance_digest: Option<&ContentDigest>,
    ) -> Result<(Vec<u8>, String), ImageError> {
        let key = match instance_digest {
            None => LayoutKey::Manifest,
            Some(digest) => LayoutKey::InstanceManifest(digest.clone()),
        };
        let path = self.path(&key);
        match read_optional(&path).await? {
            Some(manifest) => {
                log::trace!("manifest at {:?}, {}", path, String::from_utf8_lossy(&manifest));
                Ok((manifest, String::new()))
            }
            None => Err(ImageError::ManifestNotFound(path.display().to_string())),
        }
    }

    async fn get_blob(&self, digest: &str) -> Result<BlobReader, ImageError> {
        let path = self.path(&LayoutKey::Blob(digest.to_owned()));
        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(ImageError::BlobNotFound(digest.to_owned()))
            }
            Err(err) => return Err(ImageError::storage(&path)(err)),
        };
        let size = file
            .metadata()
            .await
            .map_err(ImageError::storage(&path))?
            .len();
        log::debug!("opened blob {} at {:?}, {} bytes", digest, path, size);
        Ok(BlobReader::new(digest, Some(size), file))
    }

    async fn get_signatures(&self) -> Result<Vec<Vec<u8>>, ImageError> {
        let _lock = match DirectoryLock::shared(self.reference.path()).await? {
            Some(lock) => lock,
            None => return Ok(Vec::new()),
        };
        self.read_signatures().await
    }

    async fn delete(&self) -> Result<(), ImageError> {
        let dir = self.reference.path();
        if !self.has_layout_artifact().await? {
            return Err(ImageError::ImageNotFound(dir.display().to_string()));
        }
        fs::remove_dir_all(dir)
            .await
            .map_err(|err| match err.kind() {
                io::ErrorKind::NotFound => ImageError::ImageNotFound(dir.display().to_string()),
                _ => ImageError::storage(dir)(err),
            })?;
        log::info!("deleted image directory {:?}", dir);
        Ok(())
    }
}
