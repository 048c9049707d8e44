//! Local filesystem blob store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{BlobError, BlobResult};
use crate::store::BlobStore;

/// Filesystem-backed store rooted at one directory. Keys map directly to
/// relative paths, so the on-disk tree matches the key layout.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> BlobResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    async fn ensure_parent(&self, path: &Path) -> BlobResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put_file(&self, key: &str, path: &Path, _content_type: &str) -> BlobResult<()> {
        let dest = self.path_for(key);
        self.ensure_parent(&dest).await?;
        tokio::fs::copy(path, &dest).await?;
        debug!(key = key, "stored file");
        Ok(())
    }

    async fn put_bytes(&self, key: &str, data: Vec<u8>, _content_type: &str) -> BlobResult<()> {
        let dest = self.path_for(key);
        self.ensure_parent(&dest).await?;
        tokio::fs::write(&dest, data).await?;
        debug!(key = key, "stored bytes");
        Ok(())
    }

    async fn get_bytes(&self, key: &str) -> BlobResult<Vec<u8>> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::not_found(key))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn download_to(&self, key: &str, path: &Path) -> BlobResult<()> {
        let src = self.path_for(key);
        if !src.exists() {
            return Err(BlobError::not_found(key));
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&src, path).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> BlobResult<bool> {
        Ok(self.path_for(key).exists())
    }

    async fn delete_prefix(&self, prefix: &str) -> BlobResult<u32> {
        let dir = self.path_for(prefix);
        if !dir.exists() {
            return Ok(0);
        }
        // Count files before removal for parity with the object-store backend
        let mut count = 0u32;
        let mut stack = vec![dir.clone()];
        while let Some(d) = stack.pop() {
            let mut entries = tokio::fs::read_dir(&d)
                .await
                .map_err(|e| BlobError::DeleteFailed(e.to_string()))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| BlobError::DeleteFailed(e.to_string()))?
            {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    count += 1;
                }
            }
        }
        tokio::fs::remove_dir_all(&dir)
            .await
            .map_err(|e| BlobError::DeleteFailed(e.to_string()))?;
        debug!(prefix = prefix, deleted = count, "deleted prefix");
        Ok(count)
    }

    fn url_for(&self, key: &str) -> String {
        format!("file://{}", self.path_for(key).display())
    }

    fn local_path(&self, key: &str) -> Option<PathBuf> {
        Some(self.path_for(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn roundtrip_bytes() {
        let dir = tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path()).unwrap();

        store
            .put_bytes("derived/m1/audio.wav", b"RIFF".to_vec(), "audio/wav")
            .await
            .unwrap();
        assert!(store.exists("derived/m1/audio.wav").await.unwrap());
        assert_eq!(store.get_bytes("derived/m1/audio.wav").await.unwrap(), b"RIFF");
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let dir = tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path()).unwrap();
        assert!(matches!(
            store.get_bytes("nope").await.unwrap_err(),
            BlobError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn delete_prefix_removes_job_scratch() {
        let dir = tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path()).unwrap();

        store
            .put_bytes("tmp/j1/segments/0.mkv", vec![0u8; 8], "video/x-matroska")
            .await
            .unwrap();
        store
            .put_bytes("tmp/j1/segments/1.mkv", vec![0u8; 8], "video/x-matroska")
            .await
            .unwrap();

        let deleted = store.delete_prefix("tmp/j1/").await.unwrap();
        assert_eq!(deleted, 2);
        assert!(!store.exists("tmp/j1/segments/0.mkv").await.unwrap());
        // Deleting again is a no-op
        assert_eq!(store.delete_prefix("tmp/j1/").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn local_path_points_inside_root() {
        let dir = tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path()).unwrap();
        let path = store.local_path("renders/p1/9x16.mp4").unwrap();
        assert!(path.starts_with(dir.path()));
        assert!(store.url_for("renders/p1/9x16.mp4").starts_with("file://"));
    }
}
