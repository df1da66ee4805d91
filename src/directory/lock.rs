use crate::errors::ImageError;
use fs4::fs_std::FileExt;
use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
};
use tokio::task;

/// An advisory lock held on an image directory
///
/// A signature list spans several files. Readers hold the lock shared while
/// they walk the list, and a writer holds it exclusive while it replaces the
/// list, so a reader sees either the old list or the new one. The lock is
/// taken on the directory itself, leaving the layout untouched, and it is
/// released when dropped.
pub struct DirectoryLock {
    file: File,
    path: PathBuf,
}

impl DirectoryLock {
    /// Wait for a shared lock, or `None` if the directory does not exist
    pub async fn shared(dir: &Path) -> Result<Option<DirectoryLock>, ImageError> {
        DirectoryLock::acquire(dir, false).await
    }

    /// Wait for an exclusive lock, or `None` if the directory does not exist
    pub async fn exclusive(dir: &Path) -> Result<Option<DirectoryLock>, ImageError> {
        DirectoryLock::acquire(dir, true).await
    }

    async fn acquire(dir: &Path, exclusive: bool) -> Result<Option<DirectoryLock>, ImageError> {
        let path = dir.to_path_buf();
        task::spawn_blocking(move || -> Result<Option<DirectoryLock>, ImageError> {
            let file = match File::open(&path) {
                Ok(file) => file,
                Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
                Err(err) => return Err(ImageError::storage(&path)(err)),
            };
            let locked = if exclusive {
                FileExt::lock_exclusive(&file)
            } else {
                FileExt::lock_shared(&file)
            };
            locked.map_err(ImageError::storage(&path))?;
            Ok(Some(DirectoryLock { file, path }))
        })
        .await?
    }
}

impl Drop for DirectoryLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            log::warn!("error unlocking {:?}, {}", self.path, err);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn shared_locks_coexist() {
        let dir = tempfile::tempdir().unwrap();
        let first = DirectoryLock::shared(dir.path()).await.unwrap();
        let second = DirectoryLock::shared(dir.path()).await.unwrap();
        assert!(first.is_some() && second.is_some());
    }

    #[tokio::test]
    async fn exclusive_waits_for_readers() {
        let dir = tempfile::tempdir().unwrap();
        let reader = DirectoryLock::shared(dir.path()).await.unwrap().unwrap();
        let other = File::open(dir.path()).unwrap();
        assert!(FileExt::try_lock_exclusive(&other).is_err());
        drop(reader);
        assert!(FileExt::try_lock_exclusive(&other).is_ok());
    }

    #[tokio::test]
    async fn missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("gone");
        assert!(DirectoryLock::exclusive(&gone).await.unwrap().is_none());
    }
}
