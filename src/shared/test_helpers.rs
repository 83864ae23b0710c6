//! In-memory doubles for the repository, object store and session service.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Bytes;
use chrono::{Duration, Utc};
use tokio::io::{AsyncRead, AsyncReadExt};
use uuid::Uuid;

use crate::core::error::{AppError, Result};
use crate::features::auth::clients::{AuthChecker, AuthClientError};
use crate::features::auth::model::{CheckResult, Session, SessionUser};
use crate::features::files::models::{FileRecord, NewFile};
use crate::features::files::repositories::FileRepository;
use crate::modules::storage::{validate_object_key, ByteStream, ObjectStore, StorageError};

/// Shared counter of calls made to a double
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// A complete, valid session for the given user
pub fn session_for(id: i64, user_type: &str) -> CheckResult {
    CheckResult {
        user: Some(SessionUser {
            id,
            user_type: user_type.to_string(),
            display_name: format!("user {}", id),
            email: None,
            phone: None,
        }),
        session: Some(Session {
            until: Utc::now() + Duration::hours(1),
            ip: None,
            user_agent: None,
            device_id: None,
        }),
    }
}

type CheckScript = dyn Fn(&str) -> std::result::Result<CheckResult, AuthClientError> + Send + Sync;

/// Session service answering from a closure
pub struct ScriptedAuthChecker {
    script: Box<CheckScript>,
    calls: CallCounter,
}

impl ScriptedAuthChecker {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&str) -> std::result::Result<CheckResult, AuthClientError> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            calls: CallCounter::default(),
        }
    }

    /// Knows `alice` (id 42), `bob` (id 7) and `root` (admin, id 1)
    pub fn with_known_users() -> Self {
        Self::new(|token| match token {
            "alice" => Ok(session_for(42, "dispatcher")),
            "bob" => Ok(session_for(7, "driver")),
            "root" => Ok(session_for(1, "admin")),
            _ => Err(AuthClientError::SessionNotFound),
        })
    }

    pub fn calls(&self) -> CallCounter {
        self.calls.clone()
    }
}

#[async_trait]
impl AuthChecker for ScriptedAuthChecker {
    async fn check(&self, token: &str) -> std::result::Result<CheckResult, AuthClientError> {
        self.calls.bump();
        (self.script)(token)
    }
}

/// Repository keeping rows in a vector, honouring the same uniqueness rules
/// as the `files` table.
#[derive(Default)]
pub struct InMemoryFileRepository {
    rows: Mutex<Vec<FileRecord>>,
    next_id: AtomicI64,
    calls: CallCounter,
}

impl InMemoryFileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> CallCounter {
        self.calls.clone()
    }

    /// Every row, soft-deleted ones included
    pub fn all(&self) -> Vec<FileRecord> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<FileRecord>> {
        self.rows.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn first_active(&self, matches: impl Fn(&FileRecord) -> bool) -> Option<FileRecord> {
        self.lock()
            .iter()
            .find(|r| r.is_active() && matches(r))
            .cloned()
    }
}

#[async_trait]
impl FileRepository for InMemoryFileRepository {
    async fn create(&self, file: NewFile) -> Result<FileRecord> {
        self.calls.bump();
        let mut rows = self.lock();

        if rows.iter().any(|r| r.uid == file.uid) {
            return Err(AppError::Validation("file already exists".to_string()));
        }
        if (file.deleted_at.is_none() || file.upload_pending)
            && rows
                .iter()
                .any(|r| r.claims_object_path() && r.object_path == file.object_path)
        {
            return Err(AppError::Validation(
                "file with this object path already exists".to_string(),
            ));
        }

        let now = Utc::now();
        let record = FileRecord {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            uid: file.uid,
            owner_id: file.owner_id,
            filename: file.filename,
            object_path: file.object_path,
            size: file.size,
            mime_type: file.mime_type,
            created_at: now,
            updated_at: now,
            deleted_at: file.deleted_at,
            upload_pending: file.upload_pending,
        };
        rows.push(record.clone());
        Ok(record)
    }

    async fn delete(&self, uid: Uuid) -> Result<()> {
        self.calls.bump();
        let mut rows = self.lock();

        let row = rows
            .iter_mut()
            .find(|r| r.uid == uid && r.is_active())
            .ok_or_else(|| AppError::NotFound(format!("File {} not found", uid)))?;
        row.deleted_at = Some(Utc::now());
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn restore(&self, uid: Uuid) -> Result<FileRecord> {
        self.calls.bump();
        let mut rows = self.lock();

        let object_path = rows
            .iter()
            .find(|r| r.uid == uid)
            .map(|r| r.object_path.clone())
            .ok_or_else(|| AppError::NotFound(format!("File {} not found", uid)))?;
        if rows
            .iter()
            .any(|r| r.uid != uid && r.claims_object_path() && r.object_path == object_path)
        {
            return Err(AppError::Validation(
                "file with this object path already exists".to_string(),
            ));
        }

        let row = rows
            .iter_mut()
            .find(|r| r.uid == uid)
            .ok_or_else(|| AppError::NotFound(format!("File {} not found", uid)))?;
        row.deleted_at = None;
        row.upload_pending = false;
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn release(&self, uid: Uuid) -> Result<()> {
        self.calls.bump();
        if let Some(row) = self
            .lock()
            .iter_mut()
            .find(|r| r.uid == uid && r.upload_pending)
        {
            row.upload_pending = false;
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn find_by_uid(&self, uid: Uuid) -> Result<Option<FileRecord>> {
        self.calls.bump();
        Ok(self.first_active(|r| r.uid == uid))
    }

    async fn find_by_owner(
        &self,
        owner_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<FileRecord>> {
        self.calls.bump();
        Ok(self
            .lock()
            .iter()
            .filter(|r| r.is_active() && r.owner_id == owner_id)
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn find_by_filename(&self, filename: &str) -> Result<Option<FileRecord>> {
        self.calls.bump();
        Ok(self.first_active(|r| r.filename == filename))
    }

    async fn find_by_object_path(&self, object_path: &str) -> Result<Option<FileRecord>> {
        self.calls.bump();
        Ok(self.first_active(|r| r.object_path == object_path))
    }
}

/// Object store holding bodies in a map; serves them back in small chunks
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<String, (String, Vec<u8>)>>,
    fail_uploads: AtomicBool,
    broken_reads: AtomicBool,
    calls: CallCounter,
}

impl InMemoryObjectStore {
    const CHUNK_SIZE: usize = 4;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> CallCounter {
        self.calls.clone()
    }

    /// Make every upload fail with a transfer error
    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    /// Make download streams fail after the first chunk
    pub fn set_broken_reads(&self, broken: bool) {
        self.broken_reads.store(broken, Ordering::SeqCst);
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().get(key).map(|(_, body)| body.clone())
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.lock().get(key).map(|(ct, _)| ct.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (String, Vec<u8>)>> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn upload_from_reader(
        &self,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        _size: i64,
        content_type: &str,
        key: &str,
    ) -> std::result::Result<(), StorageError> {
        self.calls.bump();
        validate_object_key(key)?;
        self.lock().remove(key);

        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::Transfer {
                key: key.to_string(),
                message: "connection reset by peer".to_string(),
            });
        }

        let mut body = Vec::new();
        reader
            .read_to_end(&mut body)
            .await
            .map_err(|e| StorageError::Transfer {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        self.lock()
            .insert(key.to_string(), (content_type.to_string(), body));
        Ok(())
    }

    async fn download_stream(&self, key: &str) -> std::result::Result<ByteStream, StorageError> {
        self.calls.bump();
        validate_object_key(key)?;

        let body = self
            .object(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;

        let mut chunks: Vec<io::Result<Bytes>> = body
            .chunks(Self::CHUNK_SIZE)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        if self.broken_reads.load(Ordering::SeqCst) {
            chunks.truncate(1);
            chunks.push(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "object store connection reset",
            )));
        }

        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn remove(&self, key: &str) -> std::result::Result<(), StorageError> {
        self.calls.bump();
        validate_object_key(key)?;
        self.lock().remove(key);
        Ok(())
    }
}
