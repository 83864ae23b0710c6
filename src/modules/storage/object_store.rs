use std::io;
use std::pin::Pin;

use async_trait::async_trait;
use axum::body::Bytes;
use futures::Stream;
use thiserror::Error;
use tokio::io::AsyncRead;

use crate::core::error::AppError;

/// Object keys longer than this are rejected by S3-compatible stores
pub const MAX_OBJECT_KEY_LENGTH: usize = 1024;

/// Object bytes as they arrive from the store
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid object key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("object '{0}' not found")]
    NotFound(String),

    #[error("transfer of '{key}' failed: {message}")]
    Transfer { key: String, message: String },
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidKey { .. } => AppError::Validation(e.to_string()),
            StorageError::NotFound(_) | StorageError::Transfer { .. } => {
                AppError::Internal(e.to_string())
            }
        }
    }
}

/// Byte storage addressed by hierarchical keys
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Replace whatever is stored under `key` with the bytes read from `reader`
    async fn upload_from_reader(
        &self,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        size: i64,
        content_type: &str,
        key: &str,
    ) -> Result<(), StorageError>;

    /// Open a stream over the object; nothing is buffered beyond one chunk
    async fn download_stream(&self, key: &str) -> Result<ByteStream, StorageError>;

    /// Removing a key that does not exist succeeds
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Syntax check applied before any request reaches the store
pub fn validate_object_key(key: &str) -> Result<(), StorageError> {
    let invalid = |reason| StorageError::InvalidKey {
        key: key.to_string(),
        reason,
    };

    if key.trim().is_empty() {
        return Err(invalid("object key cannot be empty"));
    }
    if key.len() > MAX_OBJECT_KEY_LENGTH {
        return Err(invalid("object key cannot be longer than 1024 bytes"));
    }
    if key.starts_with('/') {
        return Err(invalid("object key cannot start with '/'"));
    }
    if key.contains('\0') {
        return Err(invalid("object key cannot contain NUL"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_object_key() {
        assert!(validate_object_key("42/privet-mir.pdf").is_ok());
        assert!(validate_object_key("0/report.tar.gz").is_ok());

        for key in ["", "   ", "/42/file.txt", "42/\0.txt"] {
            assert!(
                matches!(validate_object_key(key), Err(StorageError::InvalidKey { .. })),
                "key {:?} should be rejected",
                key
            );
        }

        let long = format!("1/{}", "a".repeat(MAX_OBJECT_KEY_LENGTH));
        assert!(validate_object_key(&long).is_err());
    }

    #[test]
    fn test_storage_error_classification() {
        let invalid = StorageError::InvalidKey {
            key: String::new(),
            reason: "object key cannot be empty",
        };
        assert!(matches!(AppError::from(invalid), AppError::Validation(_)));

        let transfer = StorageError::Transfer {
            key: "1/a.txt".to_string(),
            message: "connection reset".to_string(),
        };
        assert!(AppError::from(transfer).is_internal());
    }
}
