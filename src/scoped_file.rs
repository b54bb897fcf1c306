//! Scoped temporary file used to stage an upload for the analyzer.

use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// A uniquely named temp file that is deleted exactly once.
///
/// Call [`ScopedTempFile::release`] on the normal path. If the value is
/// dropped first (early return, panic, cancelled future) `Drop` does it.
/// Deletion errors are logged and swallowed.
#[derive(Debug)]
pub struct ScopedTempFile {
    inner: Option<NamedTempFile>,
    path: PathBuf,
}

impl ScopedTempFile {
    /// Create the file in `dir` and write `bytes` to it.
    pub async fn create(dir: &Path, bytes: Vec<u8>) -> std::io::Result<Self> {
        let dir = dir.to_path_buf();
        tokio::task::spawn_blocking(move || Self::create_blocking(&dir, &bytes))
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
    }

    fn create_blocking(dir: &Path, bytes: &[u8]) -> std::io::Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(".pdf")
            .tempfile_in(dir)?;
        // On error `file` is dropped here and tempfile removes it.
        file.write_all(bytes)?;
        file.flush()?;

        let path = file.path().to_path_buf();
        debug!("Staged {} bytes at {:?}", bytes.len(), path);
        Ok(Self {
            inner: Some(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file now, on the blocking pool.
    pub async fn release(self) {
        let path = self.path.clone();
        let mut staged = self;
        if let Err(e) = tokio::task::spawn_blocking(move || staged.release_inner()).await {
            // The closure owned the file; if it panicked, its Drop ran.
            warn!("Release task for {:?} did not finish: {}", path, e);
        }
    }

    fn release_inner(&mut self) {
        if let Some(file) = self.inner.take() {
            match file.close() {
                Ok(()) => debug!("Removed staged file {:?}", self.path),
                Err(e) => warn!("Failed to remove staged file {:?}: {}", self.path, e),
            }
        }
    }
}

impl Drop for ScopedTempFile {
    fn drop(&mut self) {
        self.release_inner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_writes_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let staged = ScopedTempFile::create(dir.path(), b"%PDF-1.4 body".to_vec())
            .await
            .unwrap();

        let name = staged.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("upload-"));
        assert!(name.ends_with(".pdf"));
        assert_eq!(std::fs::read(staged.path()).unwrap(), b"%PDF-1.4 body");

        let path = staged.path().to_path_buf();
        staged.release().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_drop_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let staged = ScopedTempFile::create(dir.path(), vec![1, 2, 3]).await.unwrap();
            staged.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_release_runs_off_the_runtime_thread() {
        let dir = tempfile::tempdir().unwrap();
        let staged = ScopedTempFile::create(dir.path(), vec![7u8; 64]).await.unwrap();
        let path = staged.path().to_path_buf();

        // A single-threaded runtime keeps serving other tasks while the
        // delete is in flight.
        let ticker = tokio::spawn(async { tokio::task::yield_now().await });
        staged.release().await;
        ticker.await.unwrap();

        assert!(!path.exists());
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_names_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let a = ScopedTempFile::create(dir.path(), vec![]).await.unwrap();
        let b = ScopedTempFile::create(dir.path(), vec![]).await.unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[tokio::test]
    async fn test_release_after_external_delete_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let staged = ScopedTempFile::create(dir.path(), vec![0u8; 16]).await.unwrap();
        std::fs::remove_file(staged.path()).unwrap();
        // Deletion fails underneath; must not panic.
        staged.release().await;
    }

    #[tokio::test]
    async fn test_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        assert!(ScopedTempFile::create(&missing, vec![1]).await.is_err());
    }
}
