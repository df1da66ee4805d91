use crate::{directory::paths::LayoutKey, errors::ImageError, image::ContentDigest};
use pin_project::{pin_project, pinned_drop};
use sha2::{Digest, Sha256};
use std::{
    io,
    path::{Path, PathBuf},
    pin::Pin,
    task::{Context, Poll},
};
use tokio::{
    fs::{self, File, OpenOptions},
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
};

/// A file being written under a temporary name inside an image directory
///
/// Nothing is visible under the final name until [StagedFile::commit]. If the
/// writer is dropped before that, the temporary file is removed.
#[pin_project(PinnedDrop)]
pub struct StagedFile {
    #[pin]
    temp_file: File,
    temp_path: PathBuf,
    hasher: Sha256,
    size: u64,
    committed: bool,
}

impl StagedFile {
    /// Begin writing a new temporary file in `dir`
    pub async fn create(dir: &Path) -> Result<StagedFile, ImageError> {
        let temp_path = LayoutKey::temp().to_path(dir);
        let temp_file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .await
            .map_err(ImageError::storage(&temp_path))?;
        Ok(StagedFile {
            temp_file,
            temp_path,
            hasher: Sha256::new(),
            size: 0,
            committed: false,
        })
    }

    /// Write an entire file from memory and publish it at `dest_path`
    pub async fn write_all_to(
        dir: &Path,
        dest_path: &Path,
        content: &[u8],
    ) -> Result<ContentDigest, ImageError> {
        let mut staged = StagedFile::create(dir).await?;
        staged
            .write_all(content)
            .await
            .map_err(ImageError::storage(&staged.temp_path))?;
        staged.commit(dest_path).await
    }

    /// Copy a stream to completion and publish it at `dest_path`
    pub async fn copy_to(
        dir: &Path,
        dest_path: &Path,
        stream: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<ContentDigest, ImageError> {
        let mut staged = StagedFile::create(dir).await?;
        tokio::io::copy(stream, &mut staged).await?;
        staged.commit(dest_path).await
    }

    /// Number of bytes written so far
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Flush the temporary file to disk and atomically rename it into place
    ///
    /// Returns the sha256 digest of everything written.
    pub async fn commit(mut self, dest_path: &Path) -> Result<ContentDigest, ImageError> {
        self.temp_file
            .flush()
            .await
            .map_err(ImageError::storage(&self.temp_path))?;
        self.temp_file
            .sync_all()
            .await
            .map_err(ImageError::storage(&self.temp_path))?;
        let content_digest = ContentDigest::from_parts("sha256", &self.hasher.clone().finalize())?;
        fs::rename(&self.temp_path, dest_path)
            .await
            .map_err(ImageError::storage(dest_path))?;
        self.committed = true;
        log::debug!(
            "storage commit, {} bytes, {} -> {:?}",
            self.size,
            content_digest,
            dest_path
        );
        Ok(content_digest)
    }
}

#[pinned_drop]
impl PinnedDrop for StagedFile {
    fn drop(self: Pin<&mut Self>) {
        let this = self.project();
        if !*this.committed {
            if let Err(err) = std::fs::remove_file(&this.temp_path) {
                log::warn!("error removing temp file {:?}, {}", this.temp_path, err);
            }
        }
    }
}

impl AsyncWrite for StagedFile {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, io::Error>> {
        let this = self.project();
        match this.temp_file.poll_write(cx, buf) {
            Poll::Ready(Ok(actual_size)) => {
                this.hasher.update(&buf[..actual_size]);
                *this.size += actual_size as u64;
                Poll::Ready(Ok(actual_size))
            }
            other => other,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        self.project().temp_file.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        self.project().temp_file.poll_shutdown(cx)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn commit_publishes() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("manifest.json");
        let digest = StagedFile::write_all_to(dir.path(), &dest, b"")
            .await
            .unwrap();
        assert_eq!(digest, ContentDigest::from_content(b""));
        assert_eq!(dir_entries(dir.path()), vec!["manifest.json"]);
    }

    #[tokio::test]
    async fn drop_removes_temp() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut staged = StagedFile::create(dir.path()).await.unwrap();
            staged.write_all(b"partial").await.unwrap();
            assert_eq!(staged.size(), 7);
            assert_eq!(dir_entries(dir.path()).len(), 1);
        }
        assert!(dir_entries(dir.path()).is_empty());
    }
}
