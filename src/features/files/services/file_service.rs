use futures::TryStreamExt;
use std::io;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::config::StorageConfig;
use crate::core::error::{AppError, Result};
use crate::core::metrics;
use crate::features::auth::model::{Credentials, INTEGRATION_OWNER_ID};
use crate::features::auth::Authenticator;
use crate::features::files::models::{FileRecord, NewFile};
use crate::features::files::naming::{content_disposition, make_object_path, mime_type_for};
use crate::features::files::repositories::FileRepository;
use crate::modules::storage::{validate_object_key, ByteStream, ObjectStore};

/// Fixed page returned by [`FileService::list`]
pub const LIST_PAGE_SIZE: i64 = 100;

/// An upload as received from the transport: body reader, declared size, name
pub struct UploadFile<R> {
    pub reader: R,
    pub size: i64,
    pub filename: String,
}

/// A resolved download: headers are known, bytes not yet read
pub struct FileDownload {
    pub record: FileRecord,
    pub content_disposition: String,
    body: ByteStream,
}

impl FileDownload {
    pub fn content_type(&self) -> &str {
        &self.record.mime_type
    }

    pub fn into_body(self) -> ByteStream {
        self.body
    }

    /// Copy the object into `sink` chunk by chunk. Read errors from the store
    /// are returned as they arrived.
    pub async fn write_to<W>(self, sink: &mut W) -> io::Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let mut body = self.body;
        let mut written = 0u64;

        while let Some(chunk) = body.try_next().await? {
            sink.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        sink.flush().await?;

        Ok(written)
    }
}

/// Upload, download and listing of stored files.
///
/// An upload first creates its metadata row soft-deleted, then writes the
/// bytes, and restores the row only once the write succeeded. A failed write
/// leaves the row soft-deleted so it never shows up in active queries.
pub struct FileService {
    authenticator: Arc<Authenticator>,
    repository: Arc<dyn FileRepository>,
    store: Arc<dyn ObjectStore>,
    settings: StorageConfig,
}

impl FileService {
    pub fn new(
        authenticator: Arc<Authenticator>,
        repository: Arc<dyn FileRepository>,
        store: Arc<dyn ObjectStore>,
        settings: StorageConfig,
    ) -> Self {
        Self {
            authenticator,
            repository,
            store,
            settings,
        }
    }

    async fn upload_owner(&self, credentials: &Credentials) -> Result<i64> {
        if self.settings.allow_anonymous_upload && credentials.is_anonymous() {
            return Ok(INTEGRATION_OWNER_ID);
        }

        let caller = self.authenticator.authenticate(credentials).await?;
        Ok(caller.owner_id())
    }

    pub async fn upload<R>(&self, credentials: &Credentials, file: UploadFile<R>) -> Result<FileRecord>
    where
        R: AsyncRead + Unpin + Send,
    {
        let started = Instant::now();
        let result = self.store_upload(credentials, file).await;

        metrics::record_file_operation("upload", started, &result);
        if let Ok(file) = &result {
            metrics::record_uploaded_bytes(file.size);
        }
        result
    }

    async fn store_upload<R>(&self, credentials: &Credentials, file: UploadFile<R>) -> Result<FileRecord>
    where
        R: AsyncRead + Unpin + Send,
    {
        let owner_id = self.upload_owner(credentials).await?;

        let object_path = make_object_path(owner_id, &file.filename).ok_or_else(|| {
            AppError::Validation(format!(
                "filename [{}] has no characters usable in an object path",
                file.filename
            ))
        })?;
        validate_object_key(&object_path)?;

        if self
            .repository
            .find_by_object_path(&object_path)
            .await?
            .is_some()
        {
            return Err(path_taken(&object_path));
        }

        // The pending reservation claims the path, so a concurrent upload to
        // the same path fails here before touching the store.
        let mime_type = mime_type_for(&file.filename);
        let reserved = self
            .repository
            .create(NewFile::tombstoned(
                owner_id,
                &file.filename,
                object_path.clone(),
                file.size,
                mime_type,
            ))
            .await
            .map_err(|e| match e {
                AppError::Validation(_) => path_taken(&object_path),
                other => other,
            })?;

        debug!(
            "Reserved file {} at '{}' for owner {}",
            reserved.uid, reserved.object_path, owner_id
        );

        let mut reader = file.reader;
        if let Err(e) = self
            .store
            .upload_from_reader(
                &mut reader,
                reserved.size,
                &reserved.mime_type,
                &reserved.object_path,
            )
            .await
        {
            let err = AppError::from(e);
            if err.is_internal() {
                warn!(
                    "Upload of '{}' failed, file {} stays deleted: {}",
                    reserved.object_path, reserved.uid, err
                );
            } else {
                debug!("Upload of '{}' rejected: {}", reserved.object_path, err);
            }

            if let Err(release_err) = self.repository.release(reserved.uid).await {
                error!(
                    "Cannot release object path '{}' of failed upload {}: {}",
                    reserved.object_path, reserved.uid, release_err
                );
            }
            return Err(err);
        }

        let file = self.repository.restore(reserved.uid).await.map_err(|e| {
            error!(
                "Restore of file {} failed after its bytes were written to '{}': {}",
                reserved.uid, reserved.object_path, e
            );
            e
        })?;

        info!(
            "File uploaded: uid={}, path={}, size={}, mime={}",
            file.uid, file.object_path, file.size, file.mime_type
        );

        Ok(file)
    }

    pub async fn download(&self, credentials: &Credentials, uid: &str) -> Result<FileDownload> {
        let started = Instant::now();
        let result = self.open_download(credentials, uid).await;
        metrics::record_file_operation("download", started, &result);
        result
    }

    async fn open_download(&self, credentials: &Credentials, uid: &str) -> Result<FileDownload> {
        if self.settings.download_requires_auth {
            self.authenticator.authenticate(credentials).await?;
        }

        let record = self.find_active(uid).await?;
        let content_disposition = content_disposition(&record.mime_type, &record.filename);
        let body = self.store.download_stream(&record.object_path).await?;

        debug!("Serving file {} from '{}'", record.uid, record.object_path);

        Ok(FileDownload {
            record,
            content_disposition,
            body,
        })
    }

    /// First page of the caller's active files; integrations see owner 0
    pub async fn list(&self, credentials: &Credentials) -> Result<Vec<FileRecord>> {
        let started = Instant::now();
        let result = match self.authenticator.authenticate(credentials).await {
            Ok(caller) => {
                self.repository
                    .find_by_owner(caller.owner_id(), LIST_PAGE_SIZE, 0)
                    .await
            }
            Err(e) => Err(e),
        };
        metrics::record_file_operation("list", started, &result);
        result
    }

    /// Soft-delete a file owned by the caller. The object stays in the store.
    pub async fn delete(&self, credentials: &Credentials, uid: &str) -> Result<FileRecord> {
        let started = Instant::now();
        let result = self.soft_delete(credentials, uid).await;
        metrics::record_file_operation("delete", started, &result);
        result
    }

    async fn soft_delete(&self, credentials: &Credentials, uid: &str) -> Result<FileRecord> {
        let caller = self.authenticator.authenticate(credentials).await?;

        let record = self.find_active(uid).await?;
        if record.owner_id != caller.owner_id() {
            return Err(not_found(uid));
        }

        self.repository.delete(record.uid).await?;

        info!("File soft deleted: uid={}, path={}", record.uid, record.object_path);

        Ok(record)
    }

    async fn find_active(&self, uid: &str) -> Result<FileRecord> {
        let parsed = Uuid::parse_str(uid).map_err(|_| not_found(uid))?;

        self.repository
            .find_by_uid(parsed)
            .await?
            .ok_or_else(|| not_found(uid))
    }
}

fn path_taken(object_path: &str) -> AppError {
    AppError::Validation(format!(
        "file with object path [{}] already exists",
        object_path
    ))
}

fn not_found(uid: &str) -> AppError {
    AppError::NotFound(format!("File {} not found", uid))
}
