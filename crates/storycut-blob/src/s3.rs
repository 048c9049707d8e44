//! S3-compatible blob store (R2, minio, S3 proper).

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{BlobError, BlobResult};
use crate::store::BlobStore;

/// Configuration for the S3-compatible backend.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// S3 API endpoint URL
    pub endpoint_url: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Region ("auto" for R2)
    pub region: String,
}

impl S3Config {
    /// Create config from environment variables.
    pub fn from_env() -> BlobResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("BLOB_ENDPOINT_URL")
                .map_err(|_| BlobError::config_error("BLOB_ENDPOINT_URL not set"))?,
            access_key_id: std::env::var("BLOB_ACCESS_KEY_ID")
                .map_err(|_| BlobError::config_error("BLOB_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("BLOB_SECRET_ACCESS_KEY")
                .map_err(|_| BlobError::config_error("BLOB_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("BLOB_BUCKET_NAME")
                .map_err(|_| BlobError::config_error("BLOB_BUCKET_NAME not set"))?,
            region: std::env::var("BLOB_REGION").unwrap_or_else(|_| "auto".to_string()),
        })
    }
}

/// S3-compatible [`BlobStore`] backend.
#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
    bucket: String,
}

impl S3BlobStore {
    pub async fn new(config: S3Config) -> BlobResult<Self> {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "storycut",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
        })
    }

    pub async fn from_env() -> BlobResult<Self> {
        Self::new(S3Config::from_env()?).await
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> BlobResult<()> {
        debug!("Uploading {} to {}", path.display(), key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| BlobError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| BlobError::upload_failed(e.to_string()))?;

        info!("Uploaded {} to {}", path.display(), key);
        Ok(())
    }

    async fn put_bytes(&self, key: &str, data: Vec<u8>, content_type: &str) -> BlobResult<()> {
        debug!("Uploading {} bytes to {}", data.len(), key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| BlobError::upload_failed(e.to_string()))?;

        Ok(())
    }

    async fn get_bytes(&self, key: &str) -> BlobResult<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.to_string().contains("NoSuchKey") {
                    BlobError::not_found(key)
                } else {
                    BlobError::DownloadFailed(e.to_string())
                }
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| BlobError::DownloadFailed(e.to_string()))?
            .into_bytes()
            .to_vec();

        Ok(bytes)
    }

    async fn download_to(&self, key: &str, path: &Path) -> BlobResult<()> {
        let bytes = self.get_bytes(key).await?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BlobError::DownloadFailed(e.to_string()))?;
        }
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| BlobError::DownloadFailed(e.to_string()))?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> BlobResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.to_string().contains("NotFound") || e.to_string().contains("NoSuchKey") {
                    Ok(false)
                } else {
                    Err(BlobError::DownloadFailed(e.to_string()))
                }
            }
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> BlobResult<u32> {
        // Collect keys under the prefix, then bulk-delete
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);
            if let Some(token) = continuation_token {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| BlobError::ListFailed(e.to_string()))?;

            if let Some(ref contents) = response.contents {
                for obj in contents {
                    if let Some(key) = &obj.key {
                        keys.push(key.clone());
                    }
                }
            }

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token;
            } else {
                break;
            }
        }

        if keys.is_empty() {
            return Ok(0);
        }

        let objects: Vec<_> = keys
            .iter()
            .map(|k| {
                aws_sdk_s3::types::ObjectIdentifier::builder()
                    .key(k)
                    .build()
                    .expect("valid key")
            })
            .collect();

        let delete = aws_sdk_s3::types::Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| BlobError::DeleteFailed(e.to_string()))?;

        self.client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| BlobError::DeleteFailed(e.to_string()))?;

        info!(prefix = prefix, deleted = keys.len(), "deleted prefix");
        Ok(keys.len() as u32)
    }

    fn url_for(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }
}
