//! The blob store trait and backend selection.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BlobResult;
use crate::local::LocalBlobStore;
use crate::s3::{S3BlobStore, S3Config};

/// Durable byte storage. Objects are immutable once written.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Upload a local file.
    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> BlobResult<()>;

    /// Upload raw bytes.
    async fn put_bytes(&self, key: &str, data: Vec<u8>, content_type: &str) -> BlobResult<()>;

    /// Download an object as bytes.
    async fn get_bytes(&self, key: &str) -> BlobResult<Vec<u8>>;

    /// Download an object to a local file, creating parent directories.
    async fn download_to(&self, key: &str, path: &Path) -> BlobResult<()>;

    /// Whether an object exists.
    async fn exists(&self, key: &str) -> BlobResult<bool>;

    /// Delete every object under a prefix. Missing prefixes are fine.
    async fn delete_prefix(&self, prefix: &str) -> BlobResult<u32>;

    /// A readable URI for an object (`file://...` or `s3://bucket/key`).
    /// The object need not exist yet.
    fn url_for(&self, key: &str) -> String;

    /// A local filesystem path for the object, when the backend has one.
    /// Lets FFmpeg read local-store objects without a copy.
    fn local_path(&self, _key: &str) -> Option<std::path::PathBuf> {
        None
    }
}

/// Pick a backend from the environment: S3-compatible when
/// `BLOB_ENDPOINT_URL` is set, local filesystem (`BLOB_ROOT`, default
/// `/tmp/storycut-blobs`) otherwise.
pub async fn store_from_env() -> BlobResult<Arc<dyn BlobStore>> {
    if std::env::var("BLOB_ENDPOINT_URL").is_ok() {
        let store = S3BlobStore::new(S3Config::from_env()?).await?;
        Ok(Arc::new(store))
    } else {
        let root = std::env::var("BLOB_ROOT").unwrap_or_else(|_| "/tmp/storycut-blobs".to_string());
        Ok(Arc::new(LocalBlobStore::new(root)?))
    }
}
