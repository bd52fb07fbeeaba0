use async_trait::async_trait;
use aws_sdk_s3::{primitives::ByteStream, Client as S3Client};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),
    #[error("Download failed: {0}")]
    DownloadFailed(String),
    #[error("Delete failed: {0}")]
    DeleteFailed(String),
}

/// Seam over the object store holding generated portraits. Raw uploads are
/// never persisted here; only generation outputs under
/// `generated/{account_id}/{timestamp}.jpg`.
#[async_trait]
pub trait PortraitStore: Send + Sync {
    /// Uploads JPEG bytes and returns the public URL.
    #[must_use]
    async fn put_jpeg(&self, key: &str, bytes: Vec<u8>) -> Result<String, StorageError>;
    #[must_use]
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;
    #[must_use]
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

pub struct S3PortraitStore {
    client: S3Client,
    bucket: String,
    public_base_url: String,
}

impl S3PortraitStore {
    pub fn new(client: S3Client, bucket: String, public_base_url: String) -> Self {
        Self {
            client,
            bucket,
            public_base_url,
        }
    }
}

#[async_trait]
impl PortraitStore for S3PortraitStore {
    async fn put_jpeg(&self, key: &str, bytes: Vec<u8>) -> Result<String, StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("image/jpeg")
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;

        Ok(build_public_url(&self.public_base_url, &self.bucket, key))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;

        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;
        Ok(data.into_bytes().to_vec())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::DeleteFailed(e.to_string()))?;

        Ok(())
    }
}

/// Builds a public URL for an object, supporting both templated bases
/// (`https://host/{bucket}/{key}`) and plain bases with or without the bucket
/// already included.
pub fn build_public_url(base: &str, bucket: &str, key: &str) -> String {
    let trimmed = base.trim_end_matches('/');

    if trimmed.contains("{bucket}") || trimmed.contains("{key}") {
        return trimmed.replace("{bucket}", bucket).replace("{key}", key);
    }

    if trimmed.contains(bucket) {
        format!("{}/{}", trimmed, key)
    } else {
        format!("{}/{}/{}", trimmed, bucket, key)
    }
}

#[cfg(test)]
mod tests {
    use super::build_public_url;

    #[test]
    fn plain_base_gets_bucket_and_key() {
        assert_eq!(
            build_public_url("https://cdn.example.com/", "uploads", "generated/u/1.jpg"),
            "https://cdn.example.com/uploads/generated/u/1.jpg"
        );
    }

    #[test]
    fn base_already_containing_bucket_gets_only_the_key() {
        assert_eq!(
            build_public_url("https://uploads.example.com", "uploads", "a.jpg"),
            "https://uploads.example.com/a.jpg"
        );
    }

    #[test]
    fn templated_base_is_expanded() {
        assert_eq!(
            build_public_url("https://host/{bucket}/{key}", "b", "k.jpg"),
            "https://host/b/k.jpg"
        );
    }
}
