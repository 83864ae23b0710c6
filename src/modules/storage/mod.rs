//! Storage module for file bodies
//!
//! Provides the [`ObjectStore`] abstraction and its MinIO/S3-compatible
//! implementation used for streaming uploads and downloads.

mod minio_client;
mod object_store;

pub use minio_client::MinIOClient;
pub use object_store::{validate_object_key, ByteStream, ObjectStore, StorageError};
