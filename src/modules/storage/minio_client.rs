//! MinIO/S3-compatible storage client
//!
//! Streams file bodies into and out of a single bucket.
//! Uses rust-s3 crate for lightweight S3 operations.

use std::io;

use async_trait::async_trait;
use futures::TryStreamExt;
use s3::creds::Credentials;
use s3::{Bucket, BucketConfiguration, Region};
use tokio::io::AsyncRead;
use tracing::{debug, info, warn};

use crate::core::config::MinIOConfig;
use crate::core::error::AppError;
use crate::modules::storage::object_store::{
    validate_object_key, ByteStream, ObjectStore, StorageError,
};

/// MinIO/S3-compatible storage client
pub struct MinIOClient {
    bucket: Box<Bucket>,
    region: Region,
    credentials: Credentials,
    endpoint: String,
}

impl MinIOClient {
    /// Create a new MinIO client from configuration
    pub fn new(config: MinIOConfig) -> Result<Self, AppError> {
        let credentials = Credentials::new(
            Some(&config.access_key),
            Some(&config.secret_key),
            None,
            None,
            None,
        )
        .map_err(|e| AppError::Internal(format!("Failed to create MinIO credentials: {}", e)))?;

        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
        };

        let mut bucket = Bucket::new(&config.bucket, region.clone(), credentials.clone())
            .map_err(|e| AppError::Internal(format!("Failed to create MinIO bucket: {}", e)))?;

        // Use path-style URLs for MinIO (http://endpoint/bucket instead of http://bucket.endpoint)
        bucket.set_path_style();

        info!(
            "MinIO client initialized for endpoint: {}, bucket: {}",
            config.endpoint,
            bucket.name()
        );

        Ok(Self {
            bucket,
            region,
            credentials,
            endpoint: config.endpoint,
        })
    }

    /// Ensure the bucket exists, create if not
    pub async fn ensure_bucket_exists(&self) -> Result<(), AppError> {
        match self.create_bucket().await {
            Ok(_) => {
                info!("Bucket '{}' created successfully", self.bucket.name());
                Ok(())
            }
            Err(e) => {
                let error_str = e.to_string();
                if error_str.contains("BucketAlreadyOwnedByYou")
                    || error_str.contains("BucketAlreadyExists")
                    || error_str.contains("already own it")
                {
                    debug!("Bucket '{}' already exists", self.bucket.name());
                } else {
                    warn!(
                        "Could not create bucket '{}' at {}: {}. Assuming it exists.",
                        self.bucket.name(),
                        self.endpoint,
                        e
                    );
                }
                Ok(())
            }
        }
    }

    async fn create_bucket(&self) -> Result<(), AppError> {
        let response = Bucket::create_with_path_style(
            &self.bucket.name(),
            self.region.clone(),
            self.credentials.clone(),
            BucketConfiguration::default(),
        )
        .await
        .map_err(|e| {
            AppError::Internal(format!(
                "Failed to create bucket '{}': {}",
                self.bucket.name(),
                e
            ))
        })?;

        if !response.success() {
            return Err(AppError::Internal(format!(
                "Failed to create bucket '{}': HTTP {} - {}",
                self.bucket.name(),
                response.response_code,
                response.response_text
            )));
        }

        Ok(())
    }

    /// Get the bucket name
    pub fn bucket_name(&self) -> String {
        self.bucket.name()
    }

    fn transfer_error(key: &str, message: impl ToString) -> StorageError {
        StorageError::Transfer {
            key: key.to_string(),
            message: message.to_string(),
        }
    }
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

#[async_trait]
impl ObjectStore for MinIOClient {
    async fn upload_from_reader(
        &self,
        mut reader: &mut (dyn AsyncRead + Unpin + Send),
        size: i64,
        content_type: &str,
        key: &str,
    ) -> Result<(), StorageError> {
        validate_object_key(key)?;

        self.remove(key).await?;

        let response = self
            .bucket
            .put_object_stream_with_content_type(&mut reader, key, content_type)
            .await
            .map_err(|e| Self::transfer_error(key, e))?;

        let status = response.status_code();
        if !is_success(status) {
            return Err(Self::transfer_error(key, format!("HTTP {}", status)));
        }

        let uploaded = response.uploaded_bytes() as i64;
        if size >= 0 && uploaded != size {
            // The metadata row keeps the declared size
            warn!(
                "Declared size {} differs from uploaded {} bytes for '{}'",
                size, uploaded, key
            );
        }

        debug!(
            "Uploaded '{}' ({} bytes) to bucket '{}'",
            key,
            uploaded,
            self.bucket.name()
        );
        Ok(())
    }

    async fn download_stream(&self, key: &str) -> Result<ByteStream, StorageError> {
        validate_object_key(key)?;

        let response = self
            .bucket
            .get_object_stream(key)
            .await
            .map_err(|e| Self::transfer_error(key, e))?;

        match response.status_code {
            status if is_success(status) => {}
            404 => return Err(StorageError::NotFound(key.to_string())),
            status => return Err(Self::transfer_error(key, format!("HTTP {}", status))),
        }

        debug!(
            "Streaming '{}' from bucket '{}'",
            key,
            self.bucket.name()
        );

        let key = key.to_string();
        Ok(Box::pin(response.bytes.map_err(move |e| {
            io::Error::other(format!("Failed to read object '{}': {}", key, e))
        })))
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        validate_object_key(key)?;

        let response = self
            .bucket
            .delete_object(key)
            .await
            .map_err(|e| Self::transfer_error(key, e))?;

        match response.status_code() {
            status if is_success(status) => {
                debug!("Removed '{}' from bucket '{}'", key, self.bucket.name());
                Ok(())
            }
            404 => Ok(()),
            status => Err(Self::transfer_error(key, format!("HTTP {}", status))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MinIOConfig {
        MinIOConfig {
            endpoint: "http://localhost:9000".to_string(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            bucket: "main".to_string(),
            region: "us-east-1".to_string(),
        }
    }

    #[test]
    fn test_new_uses_configured_bucket() {
        let client = MinIOClient::new(config()).unwrap();
        assert_eq!(client.bucket_name(), "main");
    }

    #[tokio::test]
    async fn test_invalid_key_rejected_before_network() {
        let client = MinIOClient::new(config()).unwrap();
        let mut reader: &[u8] = b"payload";

        let err = client
            .upload_from_reader(&mut reader, 7, "text/plain", "")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey { .. }));

        let err = client.remove("/absolute").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey { .. }));
    }
}
