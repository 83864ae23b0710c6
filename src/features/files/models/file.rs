use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Metadata row for a stored file
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct FileRecord {
    /// Internal primary key, never exposed through the API
    pub id: i64,
    pub uid: Uuid,
    /// Uploading user; `0` for integration uploads
    pub owner_id: i64,
    pub filename: String,
    pub object_path: String,
    /// Size declared by the client at upload time
    pub size: i64,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    /// Set while the reservation's bytes are being written
    pub upload_pending: bool,
}

impl FileRecord {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Active rows and in-flight reservations own their object path
    pub fn claims_object_path(&self) -> bool {
        self.is_active() || self.upload_pending
    }
}

/// Values for a row about to be inserted
#[derive(Debug, Clone)]
pub struct NewFile {
    pub uid: Uuid,
    pub owner_id: i64,
    pub filename: String,
    pub object_path: String,
    pub size: i64,
    pub mime_type: String,
    pub deleted_at: Option<DateTime<Utc>>,
    pub upload_pending: bool,
}

impl NewFile {
    /// A row created already soft-deleted and pending; it reserves the uid and
    /// object path until the bytes are stored and the row is restored, or the
    /// write fails and the claim is released.
    pub fn tombstoned(
        owner_id: i64,
        filename: &str,
        object_path: String,
        size: i64,
        mime_type: String,
    ) -> Self {
        Self {
            uid: Uuid::new_v4(),
            owner_id,
            filename: filename.to_string(),
            object_path,
            size,
            mime_type,
            deleted_at: Some(Utc::now()),
            upload_pending: true,
        }
    }
}
