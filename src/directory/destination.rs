use crate::{
    directory::{lock::DirectoryLock, paths::LayoutKey, writer::StagedFile, DirectoryReference},
    errors::ImageError,
    image::{ContentDigest, ImageName},
    transport::ImageDestination,
};
use async_trait::async_trait;
use std::{io, path::PathBuf};
use tokio::{fs, io::AsyncRead};

/// Writes an image as files in a local directory
///
/// The directory is created when the destination is opened. Every file is
/// staged under a temporary name and renamed into place, so readers never see
/// partial content.
#[derive(Debug)]
pub struct DirectoryImageDestination {
    reference: DirectoryReference,
}

impl DirectoryImageDestination {
    pub(crate) async fn new(reference: DirectoryReference) -> Result<Self, ImageError> {
        fs::create_dir_all(reference.path())
            .await
            .map_err(ImageError::storage(reference.path()))?;
        Ok(DirectoryImageDestination { reference })
    }

    pub fn reference(&self) -> &DirectoryReference {
        &self.reference
    }

    fn path(&self, key: &LayoutKey) -> PathBuf {
        key.to_path(self.reference.path())
    }

    async fn write_file(&self, key: &LayoutKey, content: &[u8]) -> Result<ContentDigest, ImageError> {
        StagedFile::write_all_to(self.reference.path(), &self.path(key), content).await
    }
}

#[async_trait]
impl ImageDestination for DirectoryImageDestination {
    fn canonical_docker_reference(&self) -> Option<ImageName> {
        None
    }

    fn supports_signatures(&self) -> bool {
        true
    }

    async fn put_manifest(&mut self, manifest: &[u8]) -> Result<(), ImageError> {
        let digest = self.write_file(&LayoutKey::Manifest, manifest).await?;
        log::info!("stored manifest {} in {:?}", digest, self.reference.path());
        Ok(())
    }

    async fn put_blob(
        &mut self,
        digest: &str,
        stream: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<(), ImageError> {
        let dest_path = self.path(&LayoutKey::Blob(digest.to_owned()));
        let found = StagedFile::copy_to(self.reference.path(), &dest_path, stream).await?;
        let mismatch = ContentDigest::parse(digest)
            .map_or(false, |expected| expected.is_sha256() && expected != found);
        if mismatch {
            log::warn!("blob stored as {} has content digest {}", digest, found);
        }
        log::info!("stored blob {} at {:?}", digest, dest_path);
        Ok(())
    }

    async fn put_signatures(&mut self, signatures: &[Vec<u8>]) -> Result<(), ImageError> {
        let _lock = DirectoryLock::exclusive(self.reference.path())
            .await?
            .ok_or_else(|| ImageError::DirectoryMissing(self.reference.path().to_path_buf()))?;
        for (index, signature) in signatures.iter().enumerate() {
            self.write_file(&LayoutKey::Signature(index + 1), signature)
                .await?;
        }
        // Leftovers from a longer list, lowest index first
        let mut stale = signatures.len() + 1;
        loop {
            let path = self.path(&LayoutKey::Signature(stale));
            match fs::remove_file(&path).await {
                Ok(()) => stale += 1,
                Err(err) if err.kind() == io::ErrorKind::NotFound => break,
                Err(err) => return Err(ImageError::storage(&path)(err)),
            }
        }
        log::info!(
            "stored {} signatures in {:?}",
            signatures.len(),
            self.reference.path()
        );
        Ok(())
    }
}
